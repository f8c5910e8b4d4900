//! sensory-engine library - balanced assignment and delivery engine
//!
//! Latin-square randomization of blind samples across evaluator positions,
//! next-sample resolution, duplicate-submission guarding and report
//! aggregation for consumer sensory-evaluation panels.

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod engine;
pub mod guard;
pub mod latin_square;
pub mod randomization;
pub mod report;
pub mod resolver;
pub mod store;
pub mod submission;

pub use engine::{Engine, NextSample, SubmissionOutcome};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    /// Create new application state
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let api = Router::new()
        .route(
            "/api/product-types/:id/randomization",
            post(api::build_randomization).get(api::get_randomization),
        )
        .route("/api/product-types/:id/reports/hedonic", get(api::hedonic_report))
        .route("/api/product-types/:id/reports/jar", get(api::jar_report))
        .route(
            "/api/events/:event_id/evaluators/:evaluator_id",
            post(api::register_evaluator),
        )
        .route(
            "/api/events/:event_id/evaluators/:evaluator_id/next",
            get(api::next_sample),
        )
        .route(
            "/api/events/:event_id/evaluators/:evaluator_id/progress",
            get(api::evaluator_progress),
        )
        .route("/api/events/:event_id/evaluations", post(api::submit_evaluation));

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
