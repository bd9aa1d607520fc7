//! Turns a load request into the ordered statement list the executor runs.

use crate::query::{
    ast::{
        common::TableRef,
        create_table::CreateTableLike,
        delete::{Delete, KeyMatch},
        drop_table::DropTable,
        insert::InsertSelect,
        transaction::TransactionControl,
        truncate::Truncate,
    },
    builder::copy::CopyBuilder,
    dialect::Redshift,
    renderer::Render,
    to_sql,
};
use model::{
    core::table::{IdentifierError, MAX_IDENTIFIER_LEN, TableName, validate_identifier},
    load::{CopyCredentials, CopyOptions, LoadMode, ManifestRef},
};
use serde::Serialize;
use thiserror::Error;

/// Replacement text for the credentials clause in anything that gets logged.
pub const REDACTED_CREDENTIALS: &str = "CREDENTIALS 'SECRET_XXXX'";

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Invalid {role} identifier: {source}")]
    InvalidIdentifier {
        role: &'static str,
        #[source]
        source: IdentifierError,
    },

    #[error("Upsert requires a temporary table name")]
    MissingTempTable,
}

/// Statements to run as one transactional unit, plus an optional
/// compensating statement to run out of band when the unit fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadPlan {
    pub statements: Vec<String>,
    pub cleanup: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    pub mode: LoadMode,
    pub target: &'a TableName,
    /// Only consulted for [`LoadMode::Upsert`].
    pub temp_table: Option<&'a TableName>,
    pub manifest: &'a ManifestRef,
    pub credentials: &'a CopyCredentials,
    pub copy: &'a CopyOptions,
    pub id_column: &'a str,
    pub drop_temp_after: bool,
    /// Render TRUNCATE_INSERT as `DELETE FROM` inside an explicit
    /// transaction, for warehouses whose `TRUNCATE` commits implicitly.
    pub transactional_truncate: bool,
}

fn checked(table: &TableName, role: &'static str) -> Result<TableRef, PlanError> {
    table
        .validate()
        .map_err(|source| PlanError::InvalidIdentifier { role, source })?;
    Ok(TableRef::from(table))
}

fn sql(node: &dyn Render) -> String {
    to_sql(node, &Redshift)
}

pub fn plan(req: &PlanRequest<'_>) -> Result<LoadPlan, PlanError> {
    let dialect = Redshift;
    let target = checked(req.target, "target table")?;

    let copy_into = |table: TableRef| {
        CopyBuilder::new(table, &req.manifest.url())
            .credentials(&req.credentials.authorization())
            .manifest()
            .load_options(req.copy, &dialect)
            .build()
    };

    let plan = match req.mode {
        LoadMode::Insert => LoadPlan {
            statements: vec![sql(&copy_into(target))],
            cleanup: None,
        },

        LoadMode::TruncateInsert if req.transactional_truncate => LoadPlan {
            statements: vec![
                sql(&TransactionControl::Begin),
                sql(&Delete {
                    table: target.clone(),
                    filter: None,
                }),
                sql(&copy_into(target)),
                sql(&TransactionControl::Commit),
            ],
            cleanup: None,
        },

        LoadMode::TruncateInsert => LoadPlan {
            statements: vec![
                sql(&Truncate {
                    table: target.clone(),
                }),
                sql(&copy_into(target)),
            ],
            cleanup: None,
        },

        LoadMode::Upsert => {
            validate_identifier(req.id_column).map_err(|source| {
                PlanError::InvalidIdentifier {
                    role: "id column",
                    source,
                }
            })?;
            let temp = checked(
                req.temp_table.ok_or(PlanError::MissingTempTable)?,
                "temporary table",
            )?;
            let drop_temp = sql(&DropTable {
                table: temp.clone(),
                missing_ok: true,
            });

            let mut statements = vec![
                sql(&TransactionControl::Begin),
                drop_temp.clone(),
                sql(&CreateTableLike {
                    table: temp.clone(),
                    like: target.clone(),
                }),
                sql(&copy_into(temp.clone())),
                sql(&Delete {
                    table: target.clone(),
                    filter: Some(KeyMatch {
                        column: req.id_column.to_string(),
                        source: temp.clone(),
                    }),
                }),
                sql(&InsertSelect {
                    target,
                    source: temp,
                }),
            ];
            if req.drop_temp_after {
                statements.push(drop_temp.clone());
            }
            statements.push(sql(&TransactionControl::Commit));

            LoadPlan {
                statements,
                cleanup: Some(drop_temp),
            }
        }
    };

    Ok(plan)
}

/// `<table>_temp_<stamp>_<suffix>` in the schema of `base`. The table part
/// is shortened so the whole name stays within [`MAX_IDENTIFIER_LEN`]; the
/// stamp and suffix are always kept whole.
pub fn temp_table_name(base: &TableName, stamp: &str, suffix: &str) -> TableName {
    let tail = format!("_temp_{stamp}_{suffix}");
    let mut end = base.table.len().min(MAX_IDENTIFIER_LEN.saturating_sub(tail.len()));
    while !base.table.is_char_boundary(end) {
        end -= 1;
    }
    base.with_table(format!("{}{tail}", &base.table[..end]))
}

/// Masks every `CREDENTIALS [AS] '...'` clause of a rendered statement. The
/// whole literal is replaced, up to its closing quote, so a value spanning
/// several lines is masked too.
pub fn redact_credentials(sql: &str) -> String {
    const KEYWORD: &str = "CREDENTIALS";

    // ASCII uppercasing keeps byte offsets aligned with `sql`.
    let upper = sql.to_ascii_uppercase();
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    let mut from = 0;

    while let Some(found) = upper[from..].find(KEYWORD) {
        let start = from + found;
        let keyword_end = start + KEYWORD.len();
        from = keyword_end;

        let standalone = sql[..start].chars().next_back().is_none_or(char::is_whitespace)
            && sql[keyword_end..].chars().next().is_some_and(char::is_whitespace);
        if !standalone {
            continue;
        }
        let Some(open) = literal_start(&upper[keyword_end..]) else {
            continue;
        };

        let end = literal_end(sql, keyword_end + open);
        out.push_str(&sql[copied..start]);
        out.push_str(REDACTED_CREDENTIALS);
        copied = end;
        from = end;
    }

    out.push_str(&sql[copied..]);
    out.trim().to_string()
}

/// Offset of the opening quote when `tail` reads ` [AS] '...`.
fn literal_start(tail: &str) -> Option<usize> {
    let skip_whitespace = |at: usize| at + tail[at..].len() - tail[at..].trim_start().len();

    let mut at = skip_whitespace(0);
    if tail[at..].starts_with("AS") {
        let after = skip_whitespace(at + 2);
        if after == at + 2 {
            return None;
        }
        at = after;
    }
    tail[at..].starts_with('\'').then_some(at)
}

/// Offset just past the literal opened at `open`. Doubled quotes are
/// escapes. An unterminated literal runs to the end of `sql`.
fn literal_end(sql: &str, open: usize) -> usize {
    let bytes = sql.as_bytes();
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        target: TableName,
        temp: TableName,
        manifest: ManifestRef,
        credentials: CopyCredentials,
        copy: CopyOptions,
    }

    impl Fixture {
        fn new() -> Self {
            let target = TableName::new(Some("tests"), "rs_loader");
            Self {
                temp: temp_table_name(&target, "20240101_000000", "abc123"),
                target,
                manifest: ManifestRef {
                    bucket: "bucket".into(),
                    key: "prefix_manifest.json".into(),
                    entries: 2,
                },
                credentials: CopyCredentials::AccessKeys {
                    access_key_id: "AKIA".into(),
                    secret_access_key: "topsecret".into(),
                    session_token: None,
                },
                copy: CopyOptions::default(),
            }
        }

        fn request(&self, mode: LoadMode) -> PlanRequest<'_> {
            PlanRequest {
                mode,
                target: &self.target,
                temp_table: Some(&self.temp),
                manifest: &self.manifest,
                credentials: &self.credentials,
                copy: &self.copy,
                id_column: "id",
                drop_temp_after: false,
                transactional_truncate: false,
            }
        }
    }

    #[test]
    fn test_insert_is_a_single_copy() {
        let fx = Fixture::new();
        let plan = plan(&fx.request(LoadMode::Insert)).unwrap();

        assert_eq!(plan.statements.len(), 1);
        assert!(plan.statements[0].starts_with("COPY \"tests\".\"rs_loader\""));
        assert!(plan.statements[0].contains("FROM 's3://bucket/prefix_manifest.json'"));
        assert!(plan.statements[0].contains("\nMANIFEST\n"));
        assert_eq!(plan.cleanup, None);
    }

    #[test]
    fn test_truncate_insert_variants() {
        let fx = Fixture::new();
        let plain = plan(&fx.request(LoadMode::TruncateInsert)).unwrap();
        assert_eq!(plain.statements[0], r#"TRUNCATE "tests"."rs_loader";"#);
        assert_eq!(plain.statements.len(), 2);

        let mut req = fx.request(LoadMode::TruncateInsert);
        req.transactional_truncate = true;
        let tx = plan(&req).unwrap();
        assert_eq!(tx.statements.len(), 4);
        assert_eq!(tx.statements[0], "BEGIN TRANSACTION;");
        assert_eq!(tx.statements[1], r#"DELETE FROM "tests"."rs_loader";"#);
        assert_eq!(tx.statements[3], "COMMIT TRANSACTION;");
    }

    #[test]
    fn test_upsert_statement_order() {
        let fx = Fixture::new();
        let plan = plan(&fx.request(LoadMode::Upsert)).unwrap();
        let temp = r#""tests"."rs_loader_temp_20240101_000000_abc123""#;

        assert_eq!(plan.statements.len(), 7);
        assert_eq!(plan.statements[0], "BEGIN TRANSACTION;");
        assert_eq!(plan.statements[1], format!("DROP TABLE IF EXISTS {temp};"));
        assert_eq!(
            plan.statements[2],
            format!(r#"CREATE TABLE {temp} (LIKE "tests"."rs_loader");"#)
        );
        assert!(plan.statements[3].starts_with(&format!("COPY {temp}")));
        assert_eq!(
            plan.statements[4],
            format!(r#"DELETE FROM "tests"."rs_loader" WHERE "id" IN (SELECT "id" FROM {temp});"#)
        );
        assert_eq!(
            plan.statements[5],
            format!(r#"INSERT INTO "tests"."rs_loader" SELECT * FROM {temp};"#)
        );
        assert_eq!(plan.statements[6], "COMMIT TRANSACTION;");
        assert_eq!(plan.cleanup, Some(format!("DROP TABLE IF EXISTS {temp};")));
    }

    #[test]
    fn test_upsert_drops_temp_twice_when_requested() {
        let fx = Fixture::new();
        let mut req = fx.request(LoadMode::Upsert);
        req.drop_temp_after = true;
        let plan = plan(&req).unwrap();

        assert_eq!(plan.statements.len(), 8);
        let drops = plan
            .statements
            .iter()
            .filter(|s| s.starts_with("DROP TABLE IF EXISTS"))
            .count();
        assert_eq!(drops, 2);
        assert_eq!(plan.statements[6], plan.statements[1]);
        assert_eq!(plan.statements[7], "COMMIT TRANSACTION;");
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        let mut fx = Fixture::new();
        fx.target = TableName::new(Some("tests"), "x; DROP TABLE y");
        assert!(matches!(
            plan(&fx.request(LoadMode::Insert)),
            Err(PlanError::InvalidIdentifier {
                role: "target table",
                ..
            })
        ));

        let fx = Fixture::new();
        let mut req = fx.request(LoadMode::Upsert);
        req.id_column = "id)--";
        assert!(matches!(
            plan(&req),
            Err(PlanError::InvalidIdentifier {
                role: "id column",
                ..
            })
        ));

        req.id_column = "id";
        req.temp_table = None;
        assert!(matches!(plan(&req), Err(PlanError::MissingTempTable)));
    }

    #[test]
    fn test_redact_credentials() {
        let fx = Fixture::new();
        let plan = plan(&fx.request(LoadMode::Insert)).unwrap();
        assert!(plan.statements[0].contains("topsecret"));

        let redacted = redact_credentials(&plan.statements[0]);
        assert!(!redacted.contains("topsecret"));
        assert!(redacted.contains(REDACTED_CREDENTIALS));
        assert!(redacted.contains("MAXERROR 0;"));
    }

    #[test]
    fn test_temp_table_name_fits_identifier_limit() {
        let long = TableName::new(Some("tests"), &"t".repeat(100));
        let suffix = "813e9e0f5a2b4c6d8e1f2a3b4c5d6e7f";
        let temp = temp_table_name(&long, "20240101_000000", suffix);

        assert_eq!(temp.table.len(), MAX_IDENTIFIER_LEN);
        assert!(temp.table.ends_with(&format!("_temp_20240101_000000_{suffix}")));
        assert_eq!(temp.schema.as_deref(), Some("tests"));
        assert!(temp.validate().is_ok());

        let mut fx = Fixture::new();
        fx.target = long;
        fx.temp = temp;
        assert_eq!(plan(&fx.request(LoadMode::Upsert)).unwrap().statements.len(), 7);
    }

    #[test]
    fn test_temp_table_name_keeps_short_names_whole() {
        let temp = temp_table_name(&TableName::new(None, "rs_loader"), "20240101_000000", "ab");
        assert_eq!(temp.table, "rs_loader_temp_20240101_000000_ab");
    }

    #[test]
    fn test_redact_credentials_spanning_lines() {
        let sql = "COPY \"tests\".\"credentials\"\nFROM 's3://b/m.json'\nCREDENTIALS AS 'aws_access_key_id=A;aws_secret_access_key=top\nsec''ret'\nMANIFEST;";
        let redacted = redact_credentials(sql);

        assert!(!redacted.contains("top"));
        assert!(!redacted.contains("ret'"));
        assert_eq!(
            redacted,
            "COPY \"tests\".\"credentials\"\nFROM 's3://b/m.json'\nCREDENTIALS 'SECRET_XXXX'\nMANIFEST;"
        );
    }

    #[test]
    fn test_redact_credentials_unterminated_literal() {
        let redacted = redact_credentials("COPY t\ncredentials 'aws_secret_access_key=S");
        assert_eq!(redacted, "COPY t\nCREDENTIALS 'SECRET_XXXX'");
    }
}
