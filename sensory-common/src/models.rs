//! Domain models shared by the engine and its stores

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ratings::{HedonicScale, JarScore, JAR_POINTS};
use crate::{Error, Result};

/// Maximum number of evaluators (and samples) in one panel
pub const MAX_POSITIONS: u8 = 12;

/// Stable 1-based seat of an evaluator within an event (1..=12)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct EvaluatorPosition(u8);

impl EvaluatorPosition {
    pub fn new(position: u8) -> Result<Self> {
        if (1..=MAX_POSITIONS).contains(&position) {
            Ok(Self(position))
        } else {
            Err(Error::invalid(
                "position",
                format!("must be between 1 and {MAX_POSITIONS}, got {position}"),
            ))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based row index
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl TryFrom<i64> for EvaluatorPosition {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        u8::try_from(value)
            .map_err(|_| Error::invalid("position", format!("out of range: {value}")))
            .and_then(Self::new)
    }
}

impl From<EvaluatorPosition> for i64 {
    fn from(position: EvaluatorPosition) -> Self {
        position.0 as i64
    }
}

/// A product sample presented blind to evaluators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub id: Uuid,
    pub product_type_id: Uuid,
    pub brand: String,
    pub retailer_code: String,
    /// Assigned at randomization time
    pub blind_code: Option<String>,
}

/// A product category within an event, owning its samples
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductType {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    /// Admin-assigned order in which evaluators work through product types
    pub display_order: i64,
    pub has_randomization: bool,
}

/// One presentation slot in an evaluator's sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomizationEntry {
    pub sample_id: Uuid,
    pub blind_code: String,
    /// 1-based
    pub presentation_order: u32,
}

/// Ordered samples for one evaluator position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorSequence {
    pub position: EvaluatorPosition,
    pub entries: Vec<RandomizationEntry>,
}

/// Per-position presentation orders for one product type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomizationTable {
    pub product_type_id: Uuid,
    /// Sorted by position, one per provisioned evaluator slot
    pub sequences: Vec<EvaluatorSequence>,
    pub created_at: DateTime<Utc>,
}

impl RandomizationTable {
    pub fn sequence(&self, position: EvaluatorPosition) -> Option<&EvaluatorSequence> {
        self.sequences.iter().find(|s| s.position == position)
    }

    /// Number of provisioned evaluator rows
    pub fn rows(&self) -> usize {
        self.sequences.len()
    }

    pub fn sample_count(&self) -> usize {
        self.sequences.first().map_or(0, |s| s.entries.len())
    }
}

/// Definition of a just-about-right attribute for a product type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarAttribute {
    pub id: Uuid,
    pub product_type_id: Uuid,
    pub name: String,
    /// Labels for scale points 1..=5 (e.g. "Much too weak" .. "Much too strong")
    pub labels: [String; JAR_POINTS],
    pub display_order: i64,
}

/// One evaluator's stored ratings for one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub event_id: Uuid,
    pub product_type_id: Uuid,
    pub sample_id: Uuid,
    pub evaluator_id: Uuid,
    pub hedonic: HedonicScale,
    /// Keyed by JAR attribute id
    pub jar: BTreeMap<Uuid, JarScore>,
    pub created_at: DateTime<Utc>,
}
