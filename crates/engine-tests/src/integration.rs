#[cfg(test)]
mod tests {
    use crate::{
        base_settings, copy_rejected, eventually, loader, serializable_conflict, with_cleanup,
        utils::{MemoryStager, ScriptedWarehouse},
    };
    use engine_core::error::LoadError;
    use model::load::{CleanupPolicy, Manifest, RunState};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test]
    async fn tc01() {
        // Test Settings: INSERT, default cleanup policy (on success)
        // Scenario: two payloads staged, then loaded
        // Expected Outcome: three objects staged (two payloads, one manifest),
        // one bulk-load statement, one delete covering all three keys

        let stager = MemoryStager::new();
        let warehouse = ScriptedWarehouse::new();
        let loader = loader(base_settings(), &stager, &warehouse);

        loader.add_payload(r#"{"id": 1, "name": "first"}"#).unwrap();
        loader.add_payload(r#"{"id": 2, "name": "second"}"#).unwrap();
        let summary = loader.insert().await.unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(summary.statements, 1);
        assert_eq!(summary.retries, 0);
        assert_eq!(summary.table, "tests.rs_loader");
        assert_eq!(loader.state(), RunState::Done);

        let puts = stager.put_keys();
        assert_eq!(puts.len(), 3);
        assert!(puts.iter().all(|k| k.starts_with("redload/tests/rs_loader/")));
        assert_eq!(puts.iter().filter(|k| k.contains("_prt_")).count(), 2);

        let statements = warehouse.statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with(r#"COPY "tests"."rs_loader""#));
        assert!(statements[0].contains(&format!(
            "FROM 's3://rs-loader-tests/{}'",
            summary.manifest_key
        )));
        assert!(statements[0].contains("MANIFEST"));

        let deletes = stager.delete_calls();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].len(), 3);
        assert!(deletes[0].contains(&summary.manifest_key));
        assert!(stager.stored_keys().is_empty());
    }

    #[traced_test]
    #[tokio::test]
    async fn tc02() {
        // Test Settings: INSERT, cleanup never
        // Scenario: manifest contents after a load
        // Expected Outcome: one mandatory entry per payload, in registration order

        let stager = MemoryStager::new();
        let warehouse = ScriptedWarehouse::new();
        let loader = loader(with_cleanup(CleanupPolicy::Never), &stager, &warehouse);

        let first = loader.add_payload("a").unwrap();
        let second = loader.add_payload("b").unwrap();
        let summary = loader.insert().await.unwrap();

        let raw = stager.object(&summary.manifest_key).unwrap();
        let manifest: Manifest = serde_json::from_str(&raw).unwrap();
        let urls: Vec<&str> = manifest.entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                format!("s3://rs-loader-tests/{}", first.key),
                format!("s3://rs-loader-tests/{}", second.key),
            ]
        );
        assert!(manifest.entries.iter().all(|e| e.mandatory));
        assert_eq!(stager.object(&first.key).as_deref(), Some("a"));
        assert!(stager.delete_calls().is_empty());
    }

    #[traced_test]
    #[tokio::test]
    async fn tc03() {
        // Test Settings: UPSERT, temp table kept
        // Scenario: upsert with drop_temp_table disabled
        // Expected Outcome: seven statements in transaction order

        let stager = MemoryStager::new();
        let warehouse = ScriptedWarehouse::new();
        let loader = loader(base_settings().drop_temp_table(false), &stager, &warehouse);

        loader.add_payload(r#"{"id": 1}"#).unwrap();
        let summary = loader.upsert().await.unwrap();
        assert_eq!(summary.statements, 7);

        let statements = warehouse.statements();
        let expected = [
            "BEGIN TRANSACTION;",
            "DROP TABLE IF EXISTS",
            "CREATE TABLE",
            "COPY",
            r#"DELETE FROM "tests"."rs_loader" WHERE "id" IN"#,
            r#"INSERT INTO "tests"."rs_loader" SELECT * FROM"#,
            "COMMIT TRANSACTION;",
        ];
        assert_eq!(statements.len(), expected.len());
        for (sql, prefix) in statements.iter().zip(expected) {
            assert!(sql.starts_with(prefix), "{sql} should start with {prefix}");
        }
        assert!(statements[1].contains(r#""tests"."rs_loader_temp_"#));
    }

    #[traced_test]
    #[tokio::test]
    async fn tc04() {
        // Test Settings: UPSERT, temp table dropped, custom id column
        // Scenario: upsert with the default drop_temp_table
        // Expected Outcome: eight statements, the temp table dropped before commit

        let stager = MemoryStager::new();
        let warehouse = ScriptedWarehouse::new();
        let loader = loader(base_settings().id_column("user_id"), &stager, &warehouse);

        loader.add_payload(r#"{"user_id": 1}"#).unwrap();
        loader.upsert().await.unwrap();

        let statements = warehouse.statements();
        assert_eq!(statements.len(), 8);
        assert!(statements[4].contains(r#"WHERE "user_id" IN (SELECT "user_id" FROM"#));
        assert!(statements[6].starts_with("DROP TABLE IF EXISTS"));
        assert_eq!(statements[6], statements[1]);
        assert_eq!(statements[7], "COMMIT TRANSACTION;");
    }

    #[traced_test]
    #[tokio::test]
    async fn tc05() {
        // Test Settings: TRUNCATE_INSERT, plain and transactional
        // Scenario: both renderings of the truncating load
        // Expected Outcome: [TRUNCATE, COPY] by default,
        // [BEGIN, DELETE, COPY, COMMIT] when asked to stay transactional

        let stager = MemoryStager::new();
        let warehouse = ScriptedWarehouse::new();
        let plain = loader(base_settings(), &stager, &warehouse);
        plain.add_payload("x").unwrap();
        plain.truncate_insert().await.unwrap();

        let statements = warehouse.statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], r#"TRUNCATE "tests"."rs_loader";"#);
        assert!(statements[1].starts_with("COPY"));

        let warehouse = ScriptedWarehouse::new();
        let transactional = loader(
            base_settings().transactional_truncate(true),
            &stager,
            &warehouse,
        );
        transactional.add_payload("x").unwrap();
        transactional.truncate_insert().await.unwrap();

        let statements = warehouse.statements();
        assert_eq!(statements.len(), 4);
        assert_eq!(statements[0], "BEGIN TRANSACTION;");
        assert_eq!(statements[1], r#"DELETE FROM "tests"."rs_loader";"#);
        assert!(statements[2].starts_with("COPY"));
        assert_eq!(statements[3], "COMMIT TRANSACTION;");
    }

    #[traced_test]
    #[tokio::test]
    async fn tc06() {
        // Test Settings: INSERT, three payloads
        // Scenario: the second upload fails while the third is still in flight
        // Expected Outcome: UPLOAD_FAILED, the manifest is never staged, the
        // warehouse is never contacted and the third upload is cancelled

        let stager = MemoryStager::new();
        stager.fail_on("_prt_1_");
        stager.hang_on("_prt_2_");
        let warehouse = ScriptedWarehouse::new();
        let loader = loader(base_settings(), &stager, &warehouse);

        loader.add_payload("one").unwrap();
        loader.add_payload("two").unwrap();
        let third = loader.add_payload("three").unwrap();

        let err = loader.insert().await.unwrap_err();
        assert_eq!(err.code(), "UPLOAD_FAILED");
        assert!(matches!(&err, LoadError::Upload { key, .. } if key.contains("_prt_1_")));
        assert_eq!(loader.state(), RunState::Failed);

        assert!(stager.manifest_key().is_none());
        assert_eq!(warehouse.connections(), 0);
        assert!(stager.delete_calls().is_empty());

        eventually(|| stager.cancelled().contains(&third.key)).await;
    }

    #[traced_test]
    #[tokio::test]
    async fn tc07() {
        // Test Settings: every cleanup policy against both outcomes
        // Scenario: a successful load and a load whose bulk-load statement fails
        // Expected Outcome: deletion happens exactly when the policy says so

        let cases = [
            (CleanupPolicy::Always, true, 1),
            (CleanupPolicy::Always, false, 1),
            (CleanupPolicy::Never, true, 0),
            (CleanupPolicy::Never, false, 0),
            (CleanupPolicy::OnSuccess, true, 1),
            (CleanupPolicy::OnSuccess, false, 0),
        ];

        for (policy, succeed, expected_deletes) in cases {
            let stager = MemoryStager::new();
            let warehouse = ScriptedWarehouse::new();
            if !succeed {
                warehouse.fail_once("COPY", "permission denied for relation rs_loader");
            }
            let loader = loader(with_cleanup(policy), &stager, &warehouse);
            loader.add_payload("row").unwrap();

            let result = loader.insert().await;
            assert_eq!(result.is_ok(), succeed, "{policy:?}");

            let deletes = stager.delete_calls();
            assert_eq!(deletes.len(), expected_deletes, "{policy:?}, succeed: {succeed}");
            if let Some(keys) = deletes.first() {
                assert_eq!(keys.len(), 2);
            }
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn tc08() {
        // Test Settings: INSERT
        // Scenario: payloads added after the load started, and a second start
        // Expected Outcome: both rejected, nothing new staged

        let stager = MemoryStager::new();
        let warehouse = ScriptedWarehouse::new();
        let loader = loader(base_settings(), &stager, &warehouse);

        loader.add_payload("first").unwrap();
        loader.insert().await.unwrap();
        let staged = stager.put_count();

        let err = loader.add_payload("late").unwrap_err();
        assert!(matches!(err, LoadError::AlreadyStarted));
        assert_eq!(err.code(), "RS_LOAD_STARTED");
        assert_eq!(stager.put_count(), staged);
        assert_eq!(loader.tasks().len(), 1);

        assert!(matches!(
            loader.upsert().await,
            Err(LoadError::AlreadyStarted)
        ));
        assert_eq!(warehouse.statements().len(), 1);
    }

    #[traced_test]
    #[tokio::test]
    async fn tc09() {
        // Test Settings: UPSERT
        // Scenario: the DELETE step fails with an ordinary error
        // Expected Outcome: TRANSACTION_ERROR, exactly one rollback, later
        // statements never run, the temp table dropped on a fresh connection

        let stager = MemoryStager::new();
        let warehouse = ScriptedWarehouse::new();
        warehouse.fail_once("DELETE FROM", "column \"id\" does not exist");
        let loader = loader(base_settings(), &stager, &warehouse);

        loader.add_payload("row").unwrap();
        let err = loader.upsert().await.unwrap_err();

        assert_eq!(err.code(), "TRANSACTION_ERROR");
        let failure = err.failure().unwrap();
        assert_eq!(failure.step, 4);
        assert_eq!(failure.retries, 0);
        assert!(failure.message.contains("does not exist"));

        assert_eq!(warehouse.count("ROLLBACK"), 1);
        assert_eq!(warehouse.count("INSERT INTO"), 0);
        assert_eq!(warehouse.count("COMMIT"), 0);
        assert_eq!(warehouse.discards(), 1);

        let cleanup = warehouse.on_connection(1);
        assert_eq!(cleanup.len(), 1);
        assert!(cleanup[0].starts_with(r#"DROP TABLE IF EXISTS "tests"."rs_loader_temp_"#));
        assert_eq!(warehouse.connections(), 2);
    }

    #[traced_test]
    #[tokio::test]
    async fn tc10() {
        // Test Settings: UPSERT, cleanup always
        // Scenario: the bulk load is rejected and the load-error table has a record
        // Expected Outcome: RS_COPY_ERROR with the trimmed record attached,
        // cleanup executed once, staged objects deleted

        let stager = MemoryStager::new();
        let warehouse = ScriptedWarehouse::new();
        warehouse.fail_once("COPY", copy_rejected());
        let mut record = serde_json::Map::new();
        record.insert("filename".into(), json!("s3://rs-loader-tests/part.txt   "));
        record.insert("err_reason".into(), json!("Invalid digit, Value 'x'   "));
        record.insert("line_number".into(), json!("3"));
        warehouse.set_diagnostics(record);

        let loader = loader(with_cleanup(CleanupPolicy::Always), &stager, &warehouse);
        loader.add_payload(r#"{"id": "x"}"#).unwrap();
        let err = loader.upsert().await.unwrap_err();

        assert_eq!(err.code(), "RS_COPY_ERROR");
        let LoadError::CopyRejected { details, failure } = &err else {
            panic!("expected a rejected load, got {err:?}");
        };
        assert_eq!(details["err_reason"], Value::from("Invalid digit, Value 'x'"));
        assert_eq!(details["filename"], Value::from("s3://rs-loader-tests/part.txt"));
        assert_eq!(failure.step, 3);
        assert!(failure.statement.contains("CREDENTIALS 'SECRET_XXXX'"));
        assert!(!failure.statement.contains("aws_iam_role"));

        assert_eq!(warehouse.count("ROLLBACK"), 1);
        assert_eq!(warehouse.on_connection(1).len(), 1);
        assert!(warehouse.on_connection(1)[0].starts_with("DROP TABLE IF EXISTS"));
        assert_eq!(warehouse.on_connection(2).len(), 1);
        assert_eq!(warehouse.connections(), 3);

        assert_eq!(stager.delete_calls().len(), 1);
        assert_eq!(stager.delete_calls()[0].len(), 2);
    }

    #[traced_test]
    #[tokio::test]
    async fn tc11() {
        // Test Settings: INSERT
        // Scenario: the bulk load is rejected but no load-error record exists
        // Expected Outcome: RS_COPY_ERROR whose details still explain the gap

        let stager = MemoryStager::new();
        let warehouse = ScriptedWarehouse::new();
        warehouse.fail_once("COPY", copy_rejected());
        let loader = loader(base_settings(), &stager, &warehouse);

        loader.add_payload("row").unwrap();
        let err = loader.insert().await.unwrap_err();

        let LoadError::CopyRejected { details, .. } = err else {
            panic!("expected a rejected load");
        };
        assert!(!details.is_empty());
        assert!(details.contains_key("error"));
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn tc12() {
        // Test Settings: INSERT, default conflict backoff
        // Scenario: the bulk load keeps hitting serializable conflicts
        // Expected Outcome: five attempts spaced 1s, 3s, 9s and 27s apart,
        // then TRANSIENT_CONFLICT_EXHAUSTED

        let stager = MemoryStager::new();
        let warehouse = ScriptedWarehouse::new();
        warehouse.fail_times("COPY", serializable_conflict(), 10);
        let loader = loader(base_settings(), &stager, &warehouse);

        loader.add_payload("row").unwrap();
        let err = loader.insert().await.unwrap_err();

        assert_eq!(err.code(), "TRANSIENT_CONFLICT_EXHAUSTED");
        let failure = err.failure().unwrap();
        assert_eq!(failure.retries, 4);
        assert!(failure.message.contains("Serializable isolation violation"));

        let attempts: Vec<_> = warehouse
            .executed()
            .into_iter()
            .filter(|e| e.sql.starts_with("COPY"))
            .map(|e| e.at)
            .collect();
        assert_eq!(attempts.len(), 5);
        assert_eq!(warehouse.count("ROLLBACK"), 5);

        let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
        for (gap, secs) in gaps.iter().zip([1, 3, 9, 27]) {
            let expected = Duration::from_secs(secs);
            assert!(
                *gap >= expected && *gap < expected + Duration::from_millis(500),
                "gap {gap:?}, expected {expected:?}"
            );
        }
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn tc13() {
        // Test Settings: UPSERT, default conflict backoff
        // Scenario: two conflicts, then the transaction goes through
        // Expected Outcome: success with two retries, cleanup ran after each
        // failed attempt

        let stager = MemoryStager::new();
        let warehouse = ScriptedWarehouse::new();
        warehouse.fail_times("INSERT INTO", serializable_conflict(), 2);
        let loader = loader(base_settings(), &stager, &warehouse);

        loader.add_payload("row").unwrap();
        let summary = loader.upsert().await.unwrap();

        assert_eq!(summary.retries, 2);
        assert_eq!(warehouse.count("ROLLBACK"), 2);
        assert_eq!(warehouse.count("COMMIT"), 1);
        // one leading drop per attempt, the trailing drop of the committed
        // attempt and one cleanup drop per failed attempt
        assert_eq!(warehouse.count("DROP TABLE IF EXISTS"), 3 + 1 + 2);
        assert_eq!(stager.delete_calls().len(), 1);
    }

    #[traced_test]
    #[tokio::test]
    async fn tc14() {
        // Test Settings: no payloads
        // Scenario: a load started without adding anything
        // Expected Outcome: VALIDATION_ERROR, nothing staged or executed

        let stager = MemoryStager::new();
        let warehouse = ScriptedWarehouse::new();
        let loader = loader(base_settings(), &stager, &warehouse);

        let err = loader.insert().await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(loader.state(), RunState::Failed);
        assert_eq!(stager.put_count(), 0);
        assert_eq!(warehouse.connections(), 0);
        assert!(stager.delete_calls().is_empty());
    }
}
