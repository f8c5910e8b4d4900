//! # Sensory Panel Common Library
//!
//! Shared code for the sensory-evaluation engine including:
//! - Domain models (samples, product types, randomization tables, evaluations)
//! - Bounded rating types for the hedonic and just-about-right scales
//! - Configuration loading and engine settings
//! - SQLite schema initialization and migrations

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod ratings;

pub use error::{Error, Result};
pub use models::{
    EvaluatorPosition, Evaluation, EvaluatorSequence, JarAttribute, ProductType,
    RandomizationEntry, RandomizationTable, Sample,
};
pub use ratings::{HedonicAttribute, HedonicScale, HedonicScore, JarScore};
