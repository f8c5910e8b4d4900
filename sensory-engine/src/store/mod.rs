//! Persistence boundary for the engine
//!
//! The engine reads catalog data (product types, samples, JAR attributes)
//! and reads/writes randomization tables, evaluator positions and
//! evaluations through [`AssignmentStore`]. [`SqliteStore`] is the
//! production implementation; [`MemoryStore`] backs tests.

use std::collections::HashSet;

use async_trait::async_trait;
use sensory_common::{
    EvaluatorPosition, Evaluation, JarAttribute, ProductType, RandomizationTable, Result, Sample,
};
use uuid::Uuid;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Key-value style read/write boundary used by the engine
///
/// Implementations must make [`AssignmentStore::save_randomization`]
/// all-or-nothing and reject a second table for the same product type with
/// `AlreadyRandomized`, and must reject a second evaluation for the same
/// (evaluator, sample, event) with `DuplicateEvaluation`.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn product_type(&self, product_type_id: Uuid) -> Result<Option<ProductType>>;

    /// Product types of an event sorted by display order
    async fn product_types_for_event(&self, event_id: Uuid) -> Result<Vec<ProductType>>;

    /// Samples of a product type in entry order
    async fn samples(&self, product_type_id: Uuid) -> Result<Vec<Sample>>;

    async fn jar_attributes(&self, product_type_id: Uuid) -> Result<Vec<JarAttribute>>;

    async fn randomization(&self, product_type_id: Uuid) -> Result<Option<RandomizationTable>>;

    /// Atomically persist the table, the samples' blind codes and the
    /// product type's `has_randomization` flag
    ///
    /// With `replace`, an existing table and every evaluation of the
    /// product type are deleted in the same transaction.
    async fn save_randomization(
        &self,
        table: &RandomizationTable,
        blind_codes: &[(Uuid, String)],
        replace: bool,
    ) -> Result<()>;

    async fn evaluator_position(
        &self,
        event_id: Uuid,
        evaluator_id: Uuid,
    ) -> Result<Option<EvaluatorPosition>>;

    /// Seat an evaluator at the lowest free position in `1..=slots`;
    /// returns the existing seat if already registered
    async fn register_evaluator(
        &self,
        event_id: Uuid,
        evaluator_id: Uuid,
        slots: u8,
    ) -> Result<EvaluatorPosition>;

    /// Samples of the product type this evaluator has rated in the event
    async fn completed_sample_ids(
        &self,
        event_id: Uuid,
        evaluator_id: Uuid,
        product_type_id: Uuid,
    ) -> Result<HashSet<Uuid>>;

    async fn insert_evaluation(&self, evaluation: &Evaluation) -> Result<()>;

    /// All evaluations of a product type, oldest first
    async fn evaluations(&self, product_type_id: Uuid) -> Result<Vec<Evaluation>>;
}

/// Lowest position in `1..=slots` not in `taken`
pub(crate) fn lowest_free_position(
    taken: &HashSet<u8>,
    slots: u8,
) -> Option<EvaluatorPosition> {
    (1..=slots)
        .find(|p| !taken.contains(p))
        .and_then(|p| EvaluatorPosition::new(p).ok())
}
