//! HTTP API handlers for the sensory engine

pub mod error;
pub mod evaluations;
pub mod health;
pub mod randomization;
pub mod reports;
pub mod sessions;

pub use error::ApiError;
pub use evaluations::submit_evaluation;
pub use health::health_routes;
pub use randomization::{build_randomization, get_randomization};
pub use reports::{hedonic_report, jar_report};
pub use sessions::{evaluator_progress, next_sample, register_evaluator};
