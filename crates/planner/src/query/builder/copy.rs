use crate::query::{
    ast::{
        common::TableRef,
        copy::{Copy, CopyOption},
    },
    dialect::Dialect,
};
use model::load::{CopyFormat, CopyOptions};

#[derive(Debug, Clone)]
pub struct CopyBuilder {
    ast: Copy,
}

impl CopyBuilder {
    pub fn new(table: TableRef, source: &str) -> Self {
        Self {
            ast: Copy {
                table,
                source: source.to_string(),
                authorization: None,
                options: Vec::new(),
            },
        }
    }

    pub fn credentials(mut self, authorization: &str) -> Self {
        self.ast.authorization = Some(authorization.to_string());
        self
    }

    pub fn option(mut self, key: &str, value: Option<&str>) -> Self {
        self.ast.options.push(CopyOption {
            key: key.to_string(),
            value: value.map(|v| v.to_string()),
        });
        self
    }

    /// Reads the file list from a manifest instead of a key prefix.
    pub fn manifest(self) -> Self {
        self.option("MANIFEST", None)
    }

    /// Appends the format, compression and error-tolerance clauses.
    pub fn load_options(mut self, options: &CopyOptions, dialect: &dyn Dialect) -> Self {
        self = match &options.format {
            CopyFormat::Json { column_map } => {
                let arg = dialect.quote_literal(column_map.argument());
                self.option("JSON", Some(&arg))
            }
            CopyFormat::Avro { column_map } => {
                let arg = dialect.quote_literal(column_map.argument());
                self.option("AVRO", Some(&arg))
            }
            CopyFormat::Csv { delimiter, quote } => {
                let mut b = self.option("CSV", None);
                if let Some(quote) = quote {
                    let q = dialect.quote_literal(&quote.to_string());
                    b = b.option("QUOTE AS", Some(&q));
                }
                if let Some(delimiter) = delimiter {
                    let d = dialect.quote_literal(&delimiter.to_string());
                    b = b.option("DELIMITER", Some(&d));
                }
                b
            }
            CopyFormat::Parquet => return self.option("FORMAT AS", Some("PARQUET")),
            CopyFormat::Orc => return self.option("FORMAT AS", Some("ORC")),
        };

        if matches!(options.format, CopyFormat::Csv { .. }) && options.ignore_header > 0 {
            self = self.option("IGNOREHEADER", Some(&options.ignore_header.to_string()));
        }
        if !matches!(options.format, CopyFormat::Avro { .. }) {
            self = self.option("ENCODING", Some(options.encoding.as_str()));
        }
        if options.gzip {
            self = self.option("GZIP", None);
        }
        if let Some(time_format) = &options.time_format {
            let tf = dialect.quote_literal(time_format);
            self = self.option("TIMEFORMAT", Some(&tf));
        }
        if options.truncate_columns {
            self = self.option("TRUNCATECOLUMNS", None);
        }
        self.option("MAXERROR", Some(&options.max_error.to_string()))
    }

    pub fn build(self) -> Copy {
        self.ast
    }
}

#[cfg(test)]
mod tests {
    use crate::query::{
        ast::common::TableRef, builder::copy::CopyBuilder, dialect::Redshift,
    };
    use model::load::{CopyFormat, CopyOptions};

    fn keys(builder: CopyBuilder) -> Vec<String> {
        builder.build().options.into_iter().map(|o| o.key).collect()
    }

    fn users() -> TableRef {
        TableRef {
            schema: Some("public".to_string()),
            name: "users".to_string(),
        }
    }

    #[test]
    fn test_default_json_options() {
        let copy = CopyBuilder::new(users(), "s3://b/m.json")
            .manifest()
            .load_options(&CopyOptions::default(), &Redshift)
            .build();

        let rendered: Vec<(String, Option<String>)> = copy
            .options
            .into_iter()
            .map(|o| (o.key, o.value))
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("MANIFEST".to_string(), None),
                ("JSON".to_string(), Some("'auto'".to_string())),
                ("ENCODING".to_string(), Some("UTF8".to_string())),
                ("TIMEFORMAT".to_string(), Some("'auto'".to_string())),
                ("TRUNCATECOLUMNS".to_string(), None),
                ("MAXERROR".to_string(), Some("0".to_string())),
            ]
        );
    }

    #[test]
    fn test_parquet_skips_text_options() {
        let options = CopyOptions {
            format: CopyFormat::Parquet,
            gzip: true,
            ..CopyOptions::default()
        };
        let b = CopyBuilder::new(users(), "s3://b/m.json")
            .manifest()
            .load_options(&options, &Redshift);
        assert_eq!(keys(b), vec!["MANIFEST", "FORMAT AS"]);
    }

    #[test]
    fn test_csv_with_header_and_delimiter() {
        let options = CopyOptions {
            format: CopyFormat::Csv {
                delimiter: Some('|'),
                quote: None,
            },
            ignore_header: 1,
            time_format: None,
            ..CopyOptions::default()
        };
        let b = CopyBuilder::new(users(), "s3://b/m.json").load_options(&options, &Redshift);
        assert_eq!(
            keys(b),
            vec!["CSV", "DELIMITER", "IGNOREHEADER", "ENCODING", "TRUNCATECOLUMNS", "MAXERROR"]
        );
    }
}
