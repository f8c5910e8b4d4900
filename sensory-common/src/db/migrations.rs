//! Database schema migrations
//!
//! Versioned, idempotent schema upgrades applied after the base schema.
//! Never modify an existing migration; add a new one and bump
//! `CURRENT_SCHEMA_VERSION`.

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    Ok(())
}

/// Migration v1: blind codes unique within a product type
///
/// Databases created by the CRUD front end before randomization existed
/// have no such index. NULL codes (not yet randomized) are exempt.
///
/// A product type holding duplicated codes loses its randomization: the
/// table and every sample code are cleared and `has_randomization` is reset,
/// so the next build starts clean instead of being refused.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: unique blind codes per product type");

    let mut tx = pool.begin().await?;

    let affected: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT product_type_id FROM samples
        WHERE blind_code IS NOT NULL
        GROUP BY product_type_id, blind_code
        HAVING COUNT(*) > 1
        "#,
    )
    .fetch_all(&mut *tx)
    .await?;

    for product_type_id in &affected {
        warn!(
            "  Duplicated blind codes in product type {} - discarding its randomization",
            product_type_id
        );
        // Entries cascade from the header
        sqlx::query("DELETE FROM randomizations WHERE product_type_id = ?")
            .bind(product_type_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE samples SET blind_code = NULL WHERE product_type_id = ?")
            .bind(product_type_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE product_types SET has_randomization = 0 WHERE guid = ?")
            .bind(product_type_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_samples_blind_code \
         ON samples(product_type_id, blind_code)",
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!("  ✓ Added unique index on samples(product_type_id, blind_code)");
    Ok(())
}
