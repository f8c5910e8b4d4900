//! Tests for database initialization, migrations and engine settings

use sensory_common::config::{load_engine_settings, JarRangePolicy};
use sensory_common::db::{get_schema_version, init_database, CURRENT_SCHEMA_VERSION};
use std::time::Duration;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("sensory.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sensory.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_schema_tables_created() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("sensory.db")).await.unwrap();

    for table in [
        "events",
        "product_types",
        "samples",
        "jar_attributes",
        "evaluators",
        "randomizations",
        "randomization_entries",
        "evaluations",
        "settings",
    ] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "table {} missing", table);
    }

    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("sensory.db")).await.unwrap();

    let settings = load_engine_settings(&pool).await.unwrap();
    assert_eq!(settings.evaluator_slots, 12);
    assert_eq!(settings.persistence_timeout, Duration::from_millis(5000));
    assert_eq!(settings.jar_range_policy, JarRangePolicy::Drop);
}

#[tokio::test]
async fn test_settings_overrides_and_clamping() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("sensory.db")).await.unwrap();

    for (key, value) in [
        ("evaluator_slots", "40"),
        ("persistence_timeout_ms", "250"),
        ("jar_out_of_range_policy", "reject"),
    ] {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(value)
            .bind(key)
            .execute(&pool)
            .await
            .unwrap();
    }

    let settings = load_engine_settings(&pool).await.unwrap();
    assert_eq!(settings.evaluator_slots, 12, "slots are capped at 12");
    assert_eq!(settings.persistence_timeout, Duration::from_millis(250));
    assert_eq!(settings.jar_range_policy, JarRangePolicy::Reject);
}

#[tokio::test]
async fn test_null_setting_reset_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sensory.db");
    let pool = init_database(&db_path).await.unwrap();

    sqlx::query("UPDATE settings SET value = NULL WHERE key = 'evaluator_slots'")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'evaluator_slots'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(value.as_deref(), Some("12"));
}

#[tokio::test]
async fn test_blind_codes_unique_per_product_type() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("sensory.db")).await.unwrap();

    sqlx::query("INSERT INTO events (guid, name) VALUES ('e1', 'Spring panel')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO product_types (guid, event_id, name) VALUES ('pt1', 'e1', 'Cola')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO samples (guid, product_type_id, brand, retailer_code, blind_code) \
         VALUES ('s1', 'pt1', 'A', 'R1', '512')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let dup = sqlx::query(
        "INSERT INTO samples (guid, product_type_id, brand, retailer_code, blind_code) \
         VALUES ('s2', 'pt1', 'B', 'R2', '512')",
    )
    .execute(&pool)
    .await;
    assert!(dup.is_err(), "duplicate blind code within a product type must fail");
}

#[tokio::test]
async fn test_v1_migration_discards_randomization_with_duplicate_codes() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sensory.db");
    let pool = init_database(&db_path).await.unwrap();

    for statement in [
        "INSERT INTO events (guid, name) VALUES ('e1', 'Spring panel')",
        "INSERT INTO product_types (guid, event_id, name, has_randomization) VALUES ('pt1', 'e1', 'Cola', 1)",
        "INSERT INTO product_types (guid, event_id, name, has_randomization) VALUES ('pt2', 'e1', 'Juice', 1)",
        "INSERT INTO samples (guid, product_type_id, brand, retailer_code, blind_code) VALUES ('s1', 'pt1', 'A', 'R1', '101')",
        "INSERT INTO samples (guid, product_type_id, brand, retailer_code, blind_code) VALUES ('s2', 'pt1', 'B', 'R2', '102')",
        "INSERT INTO samples (guid, product_type_id, brand, retailer_code, blind_code) VALUES ('s3', 'pt2', 'C', 'R3', '555')",
        "INSERT INTO randomizations (product_type_id, evaluator_slots, created_at) VALUES ('pt1', 1, '2026-01-01T00:00:00Z')",
        "INSERT INTO randomizations (product_type_id, evaluator_slots, created_at) VALUES ('pt2', 1, '2026-01-01T00:00:00Z')",
        "INSERT INTO randomization_entries (product_type_id, position, presentation_order, sample_id, blind_code) VALUES ('pt1', 1, 1, 's1', '101')",
        "INSERT INTO randomization_entries (product_type_id, position, presentation_order, sample_id, blind_code) VALUES ('pt1', 1, 2, 's2', '102')",
        "INSERT INTO randomization_entries (product_type_id, position, presentation_order, sample_id, blind_code) VALUES ('pt2', 1, 1, 's3', '555')",
        // Roll back to a pre-v1 database holding a duplicated code
        "DROP INDEX idx_samples_blind_code",
        "UPDATE samples SET blind_code = '555' WHERE product_type_id = 'pt1'",
        "DELETE FROM schema_version",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);

    let codes: Vec<Option<String>> =
        sqlx::query_scalar("SELECT blind_code FROM samples WHERE product_type_id = 'pt1'")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(codes, vec![None, None]);

    let headers: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM randomizations WHERE product_type_id = 'pt1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    let entries: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM randomization_entries WHERE product_type_id = 'pt1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    let flag: bool =
        sqlx::query_scalar("SELECT has_randomization FROM product_types WHERE guid = 'pt1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!((headers, entries, flag), (0, 0, false));

    // Product types without duplicates keep their table and codes
    let untouched: Option<String> =
        sqlx::query_scalar("SELECT blind_code FROM samples WHERE guid = 's3'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(untouched.as_deref(), Some("555"));
    let kept: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM randomizations WHERE product_type_id = 'pt2'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(kept, 1);
}
