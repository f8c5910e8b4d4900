//! Engine facade
//!
//! The operations the surrounding application calls: build and read
//! randomization tables, seat evaluators, resolve the next sample, accept
//! submissions and produce reports. Every store call is bounded by the
//! configured persistence timeout; an elapsed timeout surfaces as a
//! retryable `PersistenceFailure` and, because the store's writes are
//! transactional, never leaves partial state behind.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sensory_common::config::EngineSettings;
use sensory_common::{
    Error, EvaluatorPosition, Evaluation, ProductType, RandomizationTable, Result,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::guard::SubmissionGuard;
use crate::randomization::{self, RandomizationPlan};
use crate::report::{self, HedonicReport, JarReport};
use crate::resolver::{self, Resolution};
use crate::store::AssignmentStore;
use crate::submission::{self, DroppedRating, EvaluationPayload};

/// What an evaluator should rate next
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NextSample {
    /// Rate this sample. Only the blind code is exposed, never brand or retailer.
    Assigned {
        product_type_id: Uuid,
        product_type_name: String,
        sample_id: Uuid,
        blind_code: String,
        presentation_order: u32,
        sample_count: usize,
    },
    /// Nothing left to rate
    Complete,
}

/// Result of a submission that was not rejected
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Accepted {
        evaluation: Evaluation,
        dropped: Vec<DroppedRating>,
        next: NextSample,
    },
    /// The pair was already stored; the evaluator simply moves on
    AlreadyEvaluated { next: NextSample },
}

/// Per-product-type progress of one evaluator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductTypeProgress {
    pub product_type_id: Uuid,
    pub name: String,
    pub randomized: bool,
    pub completed: usize,
    pub total: usize,
}

/// Balanced-assignment and delivery engine
pub struct Engine {
    store: Arc<dyn AssignmentStore>,
    guard: SubmissionGuard,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(store: Arc<dyn AssignmentStore>, settings: EngineSettings) -> Self {
        Self {
            store,
            guard: SubmissionGuard::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn guard(&self) -> &SubmissionGuard {
        &self.guard
    }

    /// Run a store call under the persistence timeout
    async fn timed<T>(&self, operation: &'static str, call: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.settings.persistence_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                error!(operation, timeout_ms = timeout.as_millis() as u64, "Store call timed out");
                Err(Error::PersistenceFailure(format!(
                    "{} timed out after {} ms",
                    operation,
                    timeout.as_millis()
                )))
            }
        }
    }

    async fn require_product_type(&self, product_type_id: Uuid) -> Result<ProductType> {
        self.timed("load product type", self.store.product_type(product_type_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("product type {}", product_type_id)))
    }

    /// Build and persist the randomization table of a product type
    ///
    /// Refused with `AlreadyRandomized` when a table exists, unless
    /// `replace` is set; replacing deletes every evaluation already
    /// submitted for the product type.
    pub async fn build_randomization(
        &self,
        product_type_id: Uuid,
        replace: bool,
    ) -> Result<RandomizationTable> {
        let product_type = self.require_product_type(product_type_id).await?;

        if !replace
            && self
                .timed("load randomization", self.store.randomization(product_type_id))
                .await?
                .is_some()
        {
            return Err(Error::AlreadyRandomized(product_type_id));
        }

        let samples = self.timed("load samples", self.store.samples(product_type_id)).await?;

        let RandomizationPlan { table, blind_codes } = randomization::build_plan(
            product_type_id,
            &samples,
            self.settings.evaluator_slots,
            &mut rand::thread_rng(),
        )?;

        self.timed(
            "save randomization",
            self.store.save_randomization(&table, &blind_codes, replace),
        )
        .await?;

        if replace {
            warn!(
                product_type = %product_type_id,
                name = %product_type.name,
                samples = samples.len(),
                "Replaced randomization table"
            );
        } else {
            info!(
                product_type = %product_type_id,
                name = %product_type.name,
                samples = samples.len(),
                evaluator_slots = table.rows(),
                "Built randomization table"
            );
        }

        Ok(table)
    }

    pub async fn get_randomization(&self, product_type_id: Uuid) -> Result<Option<RandomizationTable>> {
        self.timed("load randomization", self.store.randomization(product_type_id))
            .await
    }

    /// Seat an evaluator for an event (idempotent)
    pub async fn register_evaluator(&self, event_id: Uuid, evaluator_id: Uuid) -> Result<EvaluatorPosition> {
        let position = self
            .timed(
                "register evaluator",
                self.store
                    .register_evaluator(event_id, evaluator_id, self.settings.evaluator_slots),
            )
            .await?;
        debug!(event = %event_id, evaluator = %evaluator_id, position = position.get(), "Evaluator seated");
        Ok(position)
    }

    async fn require_position(&self, event_id: Uuid, evaluator_id: Uuid) -> Result<EvaluatorPosition> {
        self.timed(
            "load evaluator position",
            self.store.evaluator_position(event_id, evaluator_id),
        )
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "evaluator {} is not registered for event {}",
                evaluator_id, event_id
            ))
        })
    }

    /// Product types to walk, in display order
    async fn product_types_in_scope(
        &self,
        event_id: Uuid,
        product_type_id: Option<Uuid>,
    ) -> Result<Vec<ProductType>> {
        match product_type_id {
            Some(id) => {
                let product_type = self.require_product_type(id).await?;
                if product_type.event_id != event_id {
                    return Err(Error::NotFound(format!(
                        "product type {} in event {}",
                        id, event_id
                    )));
                }
                Ok(vec![product_type])
            }
            None => {
                self.timed(
                    "load product types",
                    self.store.product_types_for_event(event_id),
                )
                .await
            }
        }
    }

    /// Compute the sample this evaluator must rate next
    ///
    /// With `product_type_id`, only that product type is considered;
    /// otherwise the event's product types are walked in display order and
    /// a later one is only reached once the earlier ones are complete.
    /// Product types without a table are skipped. `completed` is the
    /// caller's snapshot of rated sample ids; when `None` it is read fresh
    /// from the store for each product type.
    pub async fn resolve_next_sample(
        &self,
        evaluator_id: Uuid,
        event_id: Uuid,
        product_type_id: Option<Uuid>,
        completed: Option<&HashSet<Uuid>>,
    ) -> Result<NextSample> {
        let position = self.require_position(event_id, evaluator_id).await?;

        for product_type in self.product_types_in_scope(event_id, product_type_id).await? {
            let Some(table) = self
                .timed("load randomization", self.store.randomization(product_type.id))
                .await?
            else {
                debug!(product_type = %product_type.id, "Skipping product type without randomization");
                continue;
            };

            let fetched;
            let completed = match completed {
                Some(snapshot) => snapshot,
                None => {
                    fetched = self
                        .timed(
                            "load completed samples",
                            self.store
                                .completed_sample_ids(event_id, evaluator_id, product_type.id),
                        )
                        .await?;
                    &fetched
                }
            };

            if let Resolution::Next(entry) = resolver::resolve(position, &table, completed)? {
                return Ok(NextSample::Assigned {
                    product_type_id: product_type.id,
                    product_type_name: product_type.name,
                    sample_id: entry.sample_id,
                    blind_code: entry.blind_code.clone(),
                    presentation_order: entry.presentation_order,
                    sample_count: table.sample_count(),
                });
            }
        }

        Ok(NextSample::Complete)
    }

    /// Validate and store one evaluation
    ///
    /// Fails with `NotFound` for an unknown product type, then with
    /// `IncompleteSubmission`/`InvalidInput` before any write,
    /// `SubmissionInFlight` while the same pair is being written by another
    /// request, and `DuplicateEvaluation` when the pair is already stored.
    pub async fn submit_evaluation(
        &self,
        evaluator_id: Uuid,
        sample_id: Uuid,
        product_type_id: Uuid,
        event_id: Uuid,
        payload: &EvaluationPayload,
    ) -> Result<(Evaluation, Vec<DroppedRating>)> {
        let product_type = self.require_product_type(product_type_id).await?;
        if product_type.event_id != event_id {
            return Err(Error::invalid(
                "product_type_id",
                format!("product type {} does not belong to event {}", product_type_id, event_id),
            ));
        }

        let attributes = self
            .timed("load JAR attributes", self.store.jar_attributes(product_type_id))
            .await?;
        let ratings = submission::validate(payload, &attributes, self.settings.jar_range_policy)?;

        let _token = self.guard.try_acquire(evaluator_id, sample_id)?;

        let samples = self.timed("load samples", self.store.samples(product_type_id)).await?;
        if !samples.iter().any(|s| s.id == sample_id) {
            return Err(Error::invalid(
                "sample_id",
                format!("sample {} does not belong to product type {}", sample_id, product_type_id),
            ));
        }
        self.require_position(event_id, evaluator_id).await?;

        let evaluation = Evaluation {
            id: Uuid::new_v4(),
            event_id,
            product_type_id,
            sample_id,
            evaluator_id,
            hedonic: ratings.hedonic,
            jar: ratings.jar,
            created_at: Utc::now(),
        };

        match self
            .timed("insert evaluation", self.store.insert_evaluation(&evaluation))
            .await
        {
            Ok(()) => {
                info!(
                    evaluator = %evaluator_id,
                    sample = %sample_id,
                    product_type = %product_type_id,
                    "Evaluation recorded"
                );
                Ok((evaluation, ratings.dropped))
            }
            Err(e @ Error::DuplicateEvaluation { .. }) => {
                info!(evaluator = %evaluator_id, sample = %sample_id, "Sample already evaluated");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Submit, then resolve what comes next
    ///
    /// A duplicate is not an error here: the evaluator is told the sample
    /// was already evaluated and advanced to the next one.
    pub async fn submit_and_advance(
        &self,
        evaluator_id: Uuid,
        sample_id: Uuid,
        product_type_id: Uuid,
        event_id: Uuid,
        payload: &EvaluationPayload,
    ) -> Result<SubmissionOutcome> {
        match self
            .submit_evaluation(evaluator_id, sample_id, product_type_id, event_id, payload)
            .await
        {
            Ok((evaluation, dropped)) => {
                let next = self
                    .resolve_next_sample(evaluator_id, event_id, None, None)
                    .await?;
                Ok(SubmissionOutcome::Accepted {
                    evaluation,
                    dropped,
                    next,
                })
            }
            Err(Error::DuplicateEvaluation { .. }) => {
                let next = self
                    .resolve_next_sample(evaluator_id, event_id, None, None)
                    .await?;
                Ok(SubmissionOutcome::AlreadyEvaluated { next })
            }
            Err(e) => Err(e),
        }
    }

    /// Completed/total samples per product type for one evaluator
    pub async fn evaluator_progress(
        &self,
        event_id: Uuid,
        evaluator_id: Uuid,
    ) -> Result<Vec<ProductTypeProgress>> {
        let product_types = self.product_types_in_scope(event_id, None).await?;
        let mut progress = Vec::with_capacity(product_types.len());

        for product_type in product_types {
            let total = self
                .timed("load samples", self.store.samples(product_type.id))
                .await?
                .len();
            let completed = self
                .timed(
                    "load completed samples",
                    self.store
                        .completed_sample_ids(event_id, evaluator_id, product_type.id),
                )
                .await?
                .len();
            progress.push(ProductTypeProgress {
                product_type_id: product_type.id,
                name: product_type.name,
                randomized: product_type.has_randomization,
                completed,
                total,
            });
        }

        Ok(progress)
    }

    pub async fn generate_hedonic_report(&self, product_type_id: Uuid) -> Result<HedonicReport> {
        self.require_product_type(product_type_id).await?;
        let samples = self.timed("load samples", self.store.samples(product_type_id)).await?;
        let evaluations = self
            .timed("load evaluations", self.store.evaluations(product_type_id))
            .await?;
        Ok(report::hedonic_report(product_type_id, &samples, &evaluations))
    }

    pub async fn generate_jar_report(&self, product_type_id: Uuid) -> Result<JarReport> {
        self.require_product_type(product_type_id).await?;
        let attributes = self
            .timed("load JAR attributes", self.store.jar_attributes(product_type_id))
            .await?;
        let samples = self.timed("load samples", self.store.samples(product_type_id)).await?;
        let evaluations = self
            .timed("load evaluations", self.store.evaluations(product_type_id))
            .await?;
        Ok(report::jar_report(product_type_id, &attributes, &samples, &evaluations))
    }
}
