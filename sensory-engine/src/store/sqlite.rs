//! SQLite-backed [`AssignmentStore`]
//!
//! Ids are stored as TEXT guids and timestamps as RFC 3339 text, matching
//! the tables created by `sensory_common::db::init_database`.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sensory_common::ratings::JAR_POINTS;
use sensory_common::{
    Error, EvaluatorPosition, EvaluatorSequence, Evaluation, HedonicScale, HedonicScore,
    JarAttribute, JarScore, ProductType, RandomizationEntry, RandomizationTable, Result, Sample,
};
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{lowest_free_position, AssignmentStore};

/// Attempts at seating an evaluator when racing another registration
const REGISTER_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_uuid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid {} '{}' in database: {}", column, value, e)))
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid {} '{}' in database: {}", column, value, e)))
}

fn hedonic(column: &str, value: i64) -> Result<HedonicScore> {
    HedonicScore::try_from(value)
        .map_err(|_| Error::Internal(format!("Stored {} rating {} out of range", column, value)))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || db_err.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_foreign_key_violation(),
        _ => false,
    }
}

type ProductTypeRow = (String, String, String, i64, bool);

fn product_type_from_row(row: ProductTypeRow) -> Result<ProductType> {
    Ok(ProductType {
        id: parse_uuid("product_types.guid", &row.0)?,
        event_id: parse_uuid("product_types.event_id", &row.1)?,
        name: row.2,
        display_order: row.3,
        has_randomization: row.4,
    })
}

type SampleRow = (String, String, String, String, Option<String>);

fn sample_from_row(row: SampleRow) -> Result<Sample> {
    Ok(Sample {
        id: parse_uuid("samples.guid", &row.0)?,
        product_type_id: parse_uuid("samples.product_type_id", &row.1)?,
        brand: row.2,
        retailer_code: row.3,
        blind_code: row.4,
    })
}

type EvaluationRow = (
    String,
    String,
    String,
    String,
    String,
    i64,
    i64,
    i64,
    i64,
    i64,
    String,
    String,
);

fn evaluation_from_row(row: EvaluationRow) -> Result<Evaluation> {
    let jar: BTreeMap<Uuid, JarScore> = serde_json::from_str(&row.10)
        .map_err(|e| Error::Internal(format!("Invalid evaluations.jar_json: {}", e)))?;

    Ok(Evaluation {
        id: parse_uuid("evaluations.guid", &row.0)?,
        event_id: parse_uuid("evaluations.event_id", &row.1)?,
        product_type_id: parse_uuid("evaluations.product_type_id", &row.2)?,
        sample_id: parse_uuid("evaluations.sample_id", &row.3)?,
        evaluator_id: parse_uuid("evaluations.evaluator_id", &row.4)?,
        hedonic: HedonicScale {
            appearance: hedonic("appearance", row.5)?,
            aroma: hedonic("aroma", row.6)?,
            flavor: hedonic("flavor", row.7)?,
            texture: hedonic("texture", row.8)?,
            overall: hedonic("overall", row.9)?,
        },
        jar,
        created_at: parse_timestamp("evaluations.created_at", &row.11)?,
    })
}

#[async_trait]
impl AssignmentStore for SqliteStore {
    async fn product_type(&self, product_type_id: Uuid) -> Result<Option<ProductType>> {
        sqlx::query_as::<_, ProductTypeRow>(
            "SELECT guid, event_id, name, display_order, has_randomization \
             FROM product_types WHERE guid = ?",
        )
        .bind(product_type_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .map(product_type_from_row)
        .transpose()
    }

    async fn product_types_for_event(&self, event_id: Uuid) -> Result<Vec<ProductType>> {
        sqlx::query_as::<_, ProductTypeRow>(
            "SELECT guid, event_id, name, display_order, has_randomization \
             FROM product_types WHERE event_id = ? ORDER BY display_order, name",
        )
        .bind(event_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(product_type_from_row)
        .collect()
    }

    async fn samples(&self, product_type_id: Uuid) -> Result<Vec<Sample>> {
        sqlx::query_as::<_, SampleRow>(
            "SELECT guid, product_type_id, brand, retailer_code, blind_code \
             FROM samples WHERE product_type_id = ? ORDER BY sort_order, rowid",
        )
        .bind(product_type_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(sample_from_row)
        .collect()
    }

    async fn jar_attributes(&self, product_type_id: Uuid) -> Result<Vec<JarAttribute>> {
        let rows = sqlx::query_as::<_, (String, String, String, String, String, String, String, String, i64)>(
            "SELECT guid, product_type_id, name, label_1, label_2, label_3, label_4, label_5, display_order \
             FROM jar_attributes WHERE product_type_id = ? ORDER BY display_order, rowid",
        )
        .bind(product_type_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(JarAttribute {
                    id: parse_uuid("jar_attributes.guid", &row.0)?,
                    product_type_id: parse_uuid("jar_attributes.product_type_id", &row.1)?,
                    name: row.2,
                    labels: [row.3, row.4, row.5, row.6, row.7],
                    display_order: row.8,
                })
            })
            .collect()
    }

    async fn randomization(&self, product_type_id: Uuid) -> Result<Option<RandomizationTable>> {
        let key = product_type_id.to_string();

        let created_at: Option<String> =
            sqlx::query_scalar("SELECT created_at FROM randomizations WHERE product_type_id = ?")
                .bind(&key)
                .fetch_optional(&self.pool)
                .await?;
        let Some(created_at) = created_at else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, (i64, i64, String, String)>(
            "SELECT position, presentation_order, sample_id, blind_code \
             FROM randomization_entries WHERE product_type_id = ? \
             ORDER BY position, presentation_order",
        )
        .bind(&key)
        .fetch_all(&self.pool)
        .await?;

        let mut sequences: Vec<EvaluatorSequence> = Vec::new();
        for (position, order, sample_id, blind_code) in rows {
            let position = EvaluatorPosition::try_from(position)?;
            let entry = RandomizationEntry {
                sample_id: parse_uuid("randomization_entries.sample_id", &sample_id)?,
                blind_code,
                presentation_order: u32::try_from(order).map_err(|_| {
                    Error::Internal(format!("Invalid presentation_order {} in database", order))
                })?,
            };
            match sequences.last_mut() {
                Some(seq) if seq.position == position => seq.entries.push(entry),
                _ => sequences.push(EvaluatorSequence {
                    position,
                    entries: vec![entry],
                }),
            }
        }

        Ok(Some(RandomizationTable {
            product_type_id,
            sequences,
            created_at: parse_timestamp("randomizations.created_at", &created_at)?,
        }))
    }

    async fn save_randomization(
        &self,
        table: &RandomizationTable,
        blind_codes: &[(Uuid, String)],
        replace: bool,
    ) -> Result<()> {
        let key = table.product_type_id.to_string();

        // Dropping `tx` without commit (error, timeout, cancellation) rolls back
        let mut tx = self.pool.begin().await?;

        if replace {
            let removed = sqlx::query("DELETE FROM evaluations WHERE product_type_id = ?")
                .bind(&key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if removed > 0 {
                warn!(
                    product_type = %table.product_type_id,
                    removed,
                    "Re-randomization discarded existing evaluations"
                );
            }
            sqlx::query("DELETE FROM randomization_entries WHERE product_type_id = ?")
                .bind(&key)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM randomizations WHERE product_type_id = ?")
                .bind(&key)
                .execute(&mut *tx)
                .await?;
        }

        let slots = table.rows() as i64;
        sqlx::query(
            "INSERT INTO randomizations (product_type_id, evaluator_slots, created_at) VALUES (?, ?, ?)",
        )
        .bind(&key)
        .bind(slots)
        .bind(table.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::AlreadyRandomized(table.product_type_id)
            } else if is_foreign_key_violation(&e) {
                Error::NotFound(format!("product type {}", table.product_type_id))
            } else {
                Error::Database(e)
            }
        })?;

        // Clear first so swapping codes between samples never collides on the unique index
        sqlx::query("UPDATE samples SET blind_code = NULL WHERE product_type_id = ?")
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        for (sample_id, code) in blind_codes {
            let updated = sqlx::query(
                "UPDATE samples SET blind_code = ? WHERE guid = ? AND product_type_id = ?",
            )
            .bind(code)
            .bind(sample_id.to_string())
            .bind(&key)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated == 0 {
                return Err(Error::invalid(
                    "blind_codes",
                    format!(
                        "sample {} does not belong to product type {}",
                        sample_id, table.product_type_id
                    ),
                ));
            }
        }

        for sequence in &table.sequences {
            for entry in &sequence.entries {
                sqlx::query(
                    "INSERT INTO randomization_entries \
                     (product_type_id, position, presentation_order, sample_id, blind_code) \
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&key)
                .bind(i64::from(sequence.position))
                .bind(entry.presentation_order as i64)
                .bind(entry.sample_id.to_string())
                .bind(&entry.blind_code)
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query("UPDATE product_types SET has_randomization = 1 WHERE guid = ?")
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn evaluator_position(
        &self,
        event_id: Uuid,
        evaluator_id: Uuid,
    ) -> Result<Option<EvaluatorPosition>> {
        let position: Option<i64> = sqlx::query_scalar(
            "SELECT position FROM evaluators WHERE event_id = ? AND evaluator_id = ?",
        )
        .bind(event_id.to_string())
        .bind(evaluator_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        position.map(EvaluatorPosition::try_from).transpose()
    }

    async fn register_evaluator(
        &self,
        event_id: Uuid,
        evaluator_id: Uuid,
        slots: u8,
    ) -> Result<EvaluatorPosition> {
        for attempt in 1..=REGISTER_ATTEMPTS {
            if let Some(position) = self.evaluator_position(event_id, evaluator_id).await? {
                return Ok(position);
            }

            let taken: Vec<i64> =
                sqlx::query_scalar("SELECT position FROM evaluators WHERE event_id = ?")
                    .bind(event_id.to_string())
                    .fetch_all(&self.pool)
                    .await?;
            let taken: HashSet<u8> = taken.into_iter().filter_map(|p| u8::try_from(p).ok()).collect();

            let position = lowest_free_position(&taken, slots).ok_or(Error::NoAssignment {
                position: slots.saturating_add(1),
                rows: slots as usize,
            })?;

            let inserted = sqlx::query(
                "INSERT INTO evaluators (event_id, evaluator_id, position) VALUES (?, ?, ?)",
            )
            .bind(event_id.to_string())
            .bind(evaluator_id.to_string())
            .bind(i64::from(position))
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(_) => return Ok(position),
                Err(e) if is_unique_violation(&e) => {
                    // Lost a race for the seat (or for this evaluator); look again
                    debug!(event = %event_id, evaluator = %evaluator_id, attempt, "Seat taken concurrently, retrying");
                }
                Err(e) if is_foreign_key_violation(&e) => {
                    return Err(Error::NotFound(format!("event {}", event_id)));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::PersistenceFailure(format!(
            "Could not seat evaluator {} after {} attempts",
            evaluator_id, REGISTER_ATTEMPTS
        )))
    }

    async fn completed_sample_ids(
        &self,
        event_id: Uuid,
        evaluator_id: Uuid,
        product_type_id: Uuid,
    ) -> Result<HashSet<Uuid>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT sample_id FROM evaluations \
             WHERE event_id = ? AND evaluator_id = ? AND product_type_id = ?",
        )
        .bind(event_id.to_string())
        .bind(evaluator_id.to_string())
        .bind(product_type_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|id| parse_uuid("evaluations.sample_id", id))
            .collect()
    }

    async fn insert_evaluation(&self, evaluation: &Evaluation) -> Result<()> {
        let jar_json = serde_json::to_string(&evaluation.jar)
            .map_err(|e| Error::Internal(format!("Failed to serialize JAR ratings: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO evaluations (
                guid, event_id, product_type_id, sample_id, evaluator_id,
                appearance, aroma, flavor, texture, overall, jar_json, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(evaluation.id.to_string())
        .bind(evaluation.event_id.to_string())
        .bind(evaluation.product_type_id.to_string())
        .bind(evaluation.sample_id.to_string())
        .bind(evaluation.evaluator_id.to_string())
        .bind(i64::from(evaluation.hedonic.appearance))
        .bind(i64::from(evaluation.hedonic.aroma))
        .bind(i64::from(evaluation.hedonic.flavor))
        .bind(i64::from(evaluation.hedonic.texture))
        .bind(i64::from(evaluation.hedonic.overall))
        .bind(jar_json)
        .bind(evaluation.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateEvaluation {
                    evaluator: evaluation.evaluator_id,
                    sample: evaluation.sample_id,
                }
            } else if is_foreign_key_violation(&e) {
                Error::NotFound(format!("event {}", evaluation.event_id))
            } else {
                Error::Database(e)
            }
        })?;

        Ok(())
    }

    async fn evaluations(&self, product_type_id: Uuid) -> Result<Vec<Evaluation>> {
        sqlx::query_as::<_, EvaluationRow>(
            r#"
            SELECT guid, event_id, product_type_id, sample_id, evaluator_id,
                   appearance, aroma, flavor, texture, overall, jar_json, created_at
            FROM evaluations
            WHERE product_type_id = ?
            ORDER BY created_at, rowid
            "#,
        )
        .bind(product_type_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(evaluation_from_row)
        .collect()
    }
}

/// Catalog writes
///
/// Events, product types, samples and JAR attributes are owned by the CRUD
/// front end; these exist so a fresh database can be populated without it.
impl SqliteStore {
    pub async fn create_event(&self, name: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO events (guid, name) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    /// Delete an event; product types, samples, tables and evaluations cascade
    pub async fn delete_event(&self, event_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM events WHERE guid = ?")
            .bind(event_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_product_type(
        &self,
        event_id: Uuid,
        name: &str,
        display_order: i64,
    ) -> Result<ProductType> {
        let product_type = ProductType {
            id: Uuid::new_v4(),
            event_id,
            name: name.to_string(),
            display_order,
            has_randomization: false,
        };
        sqlx::query(
            "INSERT INTO product_types (guid, event_id, name, display_order) VALUES (?, ?, ?, ?)",
        )
        .bind(product_type.id.to_string())
        .bind(event_id.to_string())
        .bind(name)
        .bind(display_order)
        .execute(&self.pool)
        .await?;
        Ok(product_type)
    }

    pub async fn add_sample(
        &self,
        product_type_id: Uuid,
        brand: &str,
        retailer_code: &str,
    ) -> Result<Sample> {
        let sample = Sample {
            id: Uuid::new_v4(),
            product_type_id,
            brand: brand.to_string(),
            retailer_code: retailer_code.to_string(),
            blind_code: None,
        };
        sqlx::query(
            r#"
            INSERT INTO samples (guid, product_type_id, brand, retailer_code, sort_order)
            VALUES (?, ?, ?, ?, (SELECT COUNT(*) + 1 FROM samples WHERE product_type_id = ?))
            "#,
        )
        .bind(sample.id.to_string())
        .bind(product_type_id.to_string())
        .bind(brand)
        .bind(retailer_code)
        .bind(product_type_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(sample)
    }

    pub async fn add_jar_attribute(
        &self,
        product_type_id: Uuid,
        name: &str,
        labels: [&str; JAR_POINTS],
        display_order: i64,
    ) -> Result<JarAttribute> {
        let attribute = JarAttribute {
            id: Uuid::new_v4(),
            product_type_id,
            name: name.to_string(),
            labels: labels.map(str::to_string),
            display_order,
        };
        sqlx::query(
            r#"
            INSERT INTO jar_attributes
                (guid, product_type_id, name, label_1, label_2, label_3, label_4, label_5, display_order)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attribute.id.to_string())
        .bind(product_type_id.to_string())
        .bind(name)
        .bind(labels[0])
        .bind(labels[1])
        .bind(labels[2])
        .bind(labels[3])
        .bind(labels[4])
        .bind(display_order)
        .execute(&self.pool)
        .await?;
        Ok(attribute)
    }
}
