//! Database initialization
//!
//! Creates the database on first run, applies the schema idempotently and
//! seeds default engine settings.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_events_table(pool).await?;
    create_product_types_table(pool).await?;
    create_samples_table(pool).await?;
    create_jar_attributes_table(pool).await?;
    create_evaluators_table(pool).await?;
    create_randomization_tables(pool).await?;
    create_evaluations_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores engine configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_product_types_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS product_types (
            guid TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(guid) ON DELETE CASCADE,
            name TEXT NOT NULL,
            display_order INTEGER NOT NULL DEFAULT 0,
            has_randomization INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_product_types_event ON product_types(event_id, display_order)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_samples_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS samples (
            guid TEXT PRIMARY KEY,
            product_type_id TEXT NOT NULL REFERENCES product_types(guid) ON DELETE CASCADE,
            brand TEXT NOT NULL,
            retailer_code TEXT NOT NULL,
            blind_code TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_jar_attributes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jar_attributes (
            guid TEXT PRIMARY KEY,
            product_type_id TEXT NOT NULL REFERENCES product_types(guid) ON DELETE CASCADE,
            name TEXT NOT NULL,
            label_1 TEXT NOT NULL,
            label_2 TEXT NOT NULL,
            label_3 TEXT NOT NULL,
            label_4 TEXT NOT NULL,
            label_5 TEXT NOT NULL,
            display_order INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Evaluator identity -> stable seat within an event
async fn create_evaluators_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluators (
            event_id TEXT NOT NULL REFERENCES events(guid) ON DELETE CASCADE,
            evaluator_id TEXT NOT NULL,
            position INTEGER NOT NULL CHECK (position BETWEEN 1 AND 12),
            joined_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (event_id, evaluator_id),
            UNIQUE (event_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Randomization header (one per product type) and per-slot entries
///
/// The header's primary key serializes concurrent builds: the second
/// writer hits a unique violation instead of interleaving entries.
async fn create_randomization_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS randomizations (
            product_type_id TEXT PRIMARY KEY REFERENCES product_types(guid) ON DELETE CASCADE,
            evaluator_slots INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS randomization_entries (
            product_type_id TEXT NOT NULL REFERENCES randomizations(product_type_id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            presentation_order INTEGER NOT NULL,
            sample_id TEXT NOT NULL REFERENCES samples(guid) ON DELETE CASCADE,
            blind_code TEXT NOT NULL,
            PRIMARY KEY (product_type_id, position, presentation_order),
            UNIQUE (product_type_id, position, sample_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_evaluations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluations (
            guid TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(guid) ON DELETE CASCADE,
            product_type_id TEXT NOT NULL,
            sample_id TEXT NOT NULL,
            evaluator_id TEXT NOT NULL,
            appearance INTEGER NOT NULL CHECK (appearance BETWEEN 1 AND 9),
            aroma INTEGER NOT NULL CHECK (aroma BETWEEN 1 AND 9),
            flavor INTEGER NOT NULL CHECK (flavor BETWEEN 1 AND 9),
            texture INTEGER NOT NULL CHECK (texture BETWEEN 1 AND 9),
            overall INTEGER NOT NULL CHECK (overall BETWEEN 1 AND 9),
            jar_json TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            UNIQUE (evaluator_id, sample_id, event_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_evaluations_product_type ON evaluations(product_type_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ensure all engine settings exist with default values
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "evaluator_slots", "12").await?;
    ensure_setting(pool, "persistence_timeout_ms", "5000").await?;
    ensure_setting(pool, "jar_out_of_range_policy", "drop").await?;
    Ok(())
}

/// Insert a setting if missing; reset it to the default if NULL
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match value {
        None => {
            // INSERT OR IGNORE tolerates concurrent initialization
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;
            info!("Reset NULL setting '{}' to default value: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}
