//! In-memory [`AssignmentStore`] for tests
//!
//! A single `RwLock` around all state gives the same atomicity the SQLite
//! transaction does: a randomization write is validated completely before
//! anything is mutated.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use sensory_common::{
    Error, EvaluatorPosition, Evaluation, JarAttribute, ProductType, RandomizationTable, Result,
    Sample,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{lowest_free_position, AssignmentStore};

#[derive(Debug, Default)]
struct State {
    product_types: HashMap<Uuid, ProductType>,
    /// Entry order is insertion order
    samples: Vec<Sample>,
    jar_attributes: Vec<JarAttribute>,
    tables: HashMap<Uuid, RandomizationTable>,
    positions: HashMap<(Uuid, Uuid), EvaluatorPosition>,
    evaluations: Vec<Evaluation>,
    /// Simulated latency before each write
    write_delay: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_product_type(&self, product_type: ProductType) {
        self.state
            .write()
            .await
            .product_types
            .insert(product_type.id, product_type);
    }

    pub async fn add_sample(&self, sample: Sample) {
        self.state.write().await.samples.push(sample);
    }

    pub async fn add_jar_attribute(&self, attribute: JarAttribute) {
        self.state.write().await.jar_attributes.push(attribute);
    }

    /// Delay every write by `delay`, e.g. to trip the engine's timeout
    pub async fn set_write_delay(&self, delay: Option<Duration>) {
        self.state.write().await.write_delay = delay;
    }

    async fn simulate_latency(&self) {
        let delay = self.state.read().await.write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn product_type(&self, product_type_id: Uuid) -> Result<Option<ProductType>> {
        Ok(self.state.read().await.product_types.get(&product_type_id).cloned())
    }

    async fn product_types_for_event(&self, event_id: Uuid) -> Result<Vec<ProductType>> {
        let state = self.state.read().await;
        let mut product_types: Vec<ProductType> = state
            .product_types
            .values()
            .filter(|pt| pt.event_id == event_id)
            .cloned()
            .collect();
        product_types.sort_by_key(|pt| (pt.display_order, pt.name.clone()));
        Ok(product_types)
    }

    async fn samples(&self, product_type_id: Uuid) -> Result<Vec<Sample>> {
        Ok(self
            .state
            .read()
            .await
            .samples
            .iter()
            .filter(|s| s.product_type_id == product_type_id)
            .cloned()
            .collect())
    }

    async fn jar_attributes(&self, product_type_id: Uuid) -> Result<Vec<JarAttribute>> {
        let state = self.state.read().await;
        let mut attributes: Vec<JarAttribute> = state
            .jar_attributes
            .iter()
            .filter(|a| a.product_type_id == product_type_id)
            .cloned()
            .collect();
        attributes.sort_by_key(|a| a.display_order);
        Ok(attributes)
    }

    async fn randomization(&self, product_type_id: Uuid) -> Result<Option<RandomizationTable>> {
        Ok(self.state.read().await.tables.get(&product_type_id).cloned())
    }

    async fn save_randomization(
        &self,
        table: &RandomizationTable,
        blind_codes: &[(Uuid, String)],
        replace: bool,
    ) -> Result<()> {
        self.simulate_latency().await;

        let mut state = self.state.write().await;
        let product_type_id = table.product_type_id;

        if !state.product_types.contains_key(&product_type_id) {
            return Err(Error::NotFound(format!("product type {product_type_id}")));
        }
        if state.tables.contains_key(&product_type_id) && !replace {
            return Err(Error::AlreadyRandomized(product_type_id));
        }
        let codes: HashMap<Uuid, &String> = blind_codes.iter().map(|(id, c)| (*id, c)).collect();
        let owned: HashSet<Uuid> = state
            .samples
            .iter()
            .filter(|s| s.product_type_id == product_type_id)
            .map(|s| s.id)
            .collect();
        if let Some(stray) = codes.keys().find(|id| !owned.contains(id)) {
            return Err(Error::invalid(
                "blind_codes",
                format!("sample {stray} does not belong to product type {product_type_id}"),
            ));
        }

        if replace {
            state.evaluations.retain(|e| e.product_type_id != product_type_id);
        }
        for sample in state
            .samples
            .iter_mut()
            .filter(|s| s.product_type_id == product_type_id)
        {
            sample.blind_code = codes.get(&sample.id).map(|c| c.to_string());
        }
        state.tables.insert(product_type_id, table.clone());
        if let Some(pt) = state.product_types.get_mut(&product_type_id) {
            pt.has_randomization = true;
        }
        Ok(())
    }

    async fn evaluator_position(
        &self,
        event_id: Uuid,
        evaluator_id: Uuid,
    ) -> Result<Option<EvaluatorPosition>> {
        Ok(self
            .state
            .read()
            .await
            .positions
            .get(&(event_id, evaluator_id))
            .copied())
    }

    async fn register_evaluator(
        &self,
        event_id: Uuid,
        evaluator_id: Uuid,
        slots: u8,
    ) -> Result<EvaluatorPosition> {
        let mut state = self.state.write().await;
        if let Some(position) = state.positions.get(&(event_id, evaluator_id)) {
            return Ok(*position);
        }

        let taken: HashSet<u8> = state
            .positions
            .iter()
            .filter(|((event, _), _)| *event == event_id)
            .map(|(_, p)| p.get())
            .collect();
        let position = lowest_free_position(&taken, slots).ok_or(Error::NoAssignment {
            position: slots.saturating_add(1),
            rows: slots as usize,
        })?;

        state.positions.insert((event_id, evaluator_id), position);
        Ok(position)
    }

    async fn completed_sample_ids(
        &self,
        event_id: Uuid,
        evaluator_id: Uuid,
        product_type_id: Uuid,
    ) -> Result<HashSet<Uuid>> {
        Ok(self
            .state
            .read()
            .await
            .evaluations
            .iter()
            .filter(|e| {
                e.event_id == event_id
                    && e.evaluator_id == evaluator_id
                    && e.product_type_id == product_type_id
            })
            .map(|e| e.sample_id)
            .collect())
    }

    async fn insert_evaluation(&self, evaluation: &Evaluation) -> Result<()> {
        self.simulate_latency().await;

        let mut state = self.state.write().await;
        let duplicate = state.evaluations.iter().any(|e| {
            e.evaluator_id == evaluation.evaluator_id
                && e.sample_id == evaluation.sample_id
                && e.event_id == evaluation.event_id
        });
        if duplicate {
            return Err(Error::DuplicateEvaluation {
                evaluator: evaluation.evaluator_id,
                sample: evaluation.sample_id,
            });
        }

        state.evaluations.push(evaluation.clone());
        Ok(())
    }

    async fn evaluations(&self, product_type_id: Uuid) -> Result<Vec<Evaluation>> {
        Ok(self
            .state
            .read()
            .await
            .evaluations
            .iter()
            .filter(|e| e.product_type_id == product_type_id)
            .cloned()
            .collect())
    }
}
