//! Submission payloads and their validation
//!
//! Rating values arrive as arbitrary JSON so a malformed one (a float, a
//! string) is classified here rather than failing body extraction;
//! everything past [`validate`] works with bounded
//! [`HedonicScore`]/[`JarScore`] values.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sensory_common::config::JarRangePolicy;
use sensory_common::ratings::{HEDONIC_MAX, HEDONIC_MIN, JAR_MAX, JAR_MIN};
use sensory_common::{Error, HedonicAttribute, HedonicScale, HedonicScore, JarAttribute, JarScore, Result};
use tracing::warn;
use uuid::Uuid;

/// Raw hedonic ratings as submitted; every field is required
///
/// `null` counts as missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HedonicInput {
    pub appearance: Option<Value>,
    pub aroma: Option<Value>,
    pub flavor: Option<Value>,
    pub texture: Option<Value>,
    pub overall: Option<Value>,
}

impl HedonicInput {
    pub fn get(&self, attribute: HedonicAttribute) -> Option<&Value> {
        match attribute {
            HedonicAttribute::Appearance => self.appearance.as_ref(),
            HedonicAttribute::Aroma => self.aroma.as_ref(),
            HedonicAttribute::Flavor => self.flavor.as_ref(),
            HedonicAttribute::Texture => self.texture.as_ref(),
            HedonicAttribute::Overall => self.overall.as_ref(),
        }
    }
}

/// One evaluator's answers for one sample, as received
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationPayload {
    #[serde(default)]
    pub hedonic: HedonicInput,
    /// JAR attribute id -> rating
    #[serde(default)]
    pub jar: BTreeMap<Uuid, Value>,
}

/// A JAR rating discarded under [`JarRangePolicy::Drop`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRating {
    pub attribute_id: Uuid,
    pub value: Value,
    pub reason: String,
}

/// Ratings that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRatings {
    pub hedonic: HedonicScale,
    pub jar: BTreeMap<Uuid, JarScore>,
    pub dropped: Vec<DroppedRating>,
}

/// Validate a payload against the product type's JAR attributes
///
/// Missing hedonic fields fail with `IncompleteSubmission`; non-integer or
/// out-of-range hedonic values with `InvalidInput`. JAR ratings that are not
/// integers, are out of range or name an unknown attribute are dropped or
/// rejected according to `policy`.
pub fn validate(
    payload: &EvaluationPayload,
    attributes: &[JarAttribute],
    policy: JarRangePolicy,
) -> Result<ValidatedRatings> {
    let hedonic = HedonicScale {
        appearance: hedonic_score(payload, HedonicAttribute::Appearance)?,
        aroma: hedonic_score(payload, HedonicAttribute::Aroma)?,
        flavor: hedonic_score(payload, HedonicAttribute::Flavor)?,
        texture: hedonic_score(payload, HedonicAttribute::Texture)?,
        overall: hedonic_score(payload, HedonicAttribute::Overall)?,
    };

    let known: HashSet<Uuid> = attributes.iter().map(|a| a.id).collect();
    let mut jar = BTreeMap::new();
    let mut dropped = Vec::new();

    for (&attribute_id, value) in &payload.jar {
        let score = if !known.contains(&attribute_id) {
            Err("unknown attribute for this product type".to_string())
        } else {
            match value.as_i64() {
                Some(n) if (JAR_MIN..=JAR_MAX).contains(&n) => Ok(n),
                Some(n) => Err(format!("must be between {JAR_MIN} and {JAR_MAX}, got {n}")),
                None => Err(format!(
                    "must be an integer between {JAR_MIN} and {JAR_MAX}, got {value}"
                )),
            }
        };

        match (score, policy) {
            (Ok(n), _) => {
                jar.insert(attribute_id, JarScore::try_from(n)?);
            }
            (Err(reason), JarRangePolicy::Reject) => {
                return Err(Error::invalid(format!("jar.{attribute_id}"), reason));
            }
            (Err(reason), JarRangePolicy::Drop) => {
                warn!(attribute = %attribute_id, %value, %reason, "Dropping JAR rating");
                dropped.push(DroppedRating {
                    attribute_id,
                    value: value.clone(),
                    reason,
                });
            }
        }
    }

    Ok(ValidatedRatings {
        hedonic,
        jar,
        dropped,
    })
}

fn hedonic_score(payload: &EvaluationPayload, attribute: HedonicAttribute) -> Result<HedonicScore> {
    let field = format!("hedonic.{}", attribute.name());
    let raw = payload
        .hedonic
        .get(attribute)
        .ok_or_else(|| Error::IncompleteSubmission(field.clone()))?;

    let Some(value) = raw.as_i64() else {
        return Err(Error::invalid(
            field,
            format!("must be an integer between {HEDONIC_MIN} and {HEDONIC_MAX}, got {raw}"),
        ));
    };

    HedonicScore::try_from(value).map_err(|_| {
        Error::invalid(
            field,
            format!("must be between {HEDONIC_MIN} and {HEDONIC_MAX}, got {value}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_hedonic() -> HedonicInput {
        HedonicInput {
            appearance: Some(json!(7)),
            aroma: Some(json!(6)),
            flavor: Some(json!(8)),
            texture: Some(json!(5)),
            overall: Some(json!(9)),
        }
    }

    fn attribute(name: &str) -> JarAttribute {
        JarAttribute {
            id: Uuid::new_v4(),
            product_type_id: Uuid::nil(),
            name: name.to_string(),
            labels: [
                "Much too weak".into(),
                "Too weak".into(),
                "Just about right".into(),
                "Too strong".into(),
                "Much too strong".into(),
            ],
            display_order: 0,
        }
    }

    #[test]
    fn test_valid_payload() {
        let sweetness = attribute("Sweetness");
        let payload = EvaluationPayload {
            hedonic: full_hedonic(),
            jar: [(sweetness.id, json!(3))].into_iter().collect(),
        };

        let ratings = validate(&payload, &[sweetness.clone()], JarRangePolicy::Drop).unwrap();
        assert_eq!(ratings.hedonic.overall.value(), 9);
        assert_eq!(ratings.jar[&sweetness.id].value(), 3);
        assert!(ratings.dropped.is_empty());
    }

    #[test]
    fn test_missing_hedonic_field_is_incomplete() {
        let mut hedonic = full_hedonic();
        hedonic.texture = None;
        let payload = EvaluationPayload {
            hedonic,
            jar: BTreeMap::new(),
        };

        let err = validate(&payload, &[], JarRangePolicy::Drop).unwrap_err();
        assert!(matches!(err, Error::IncompleteSubmission(ref f) if f == "hedonic.texture"));
    }

    #[test]
    fn test_out_of_range_hedonic_names_field_and_bound() {
        let mut hedonic = full_hedonic();
        hedonic.aroma = Some(json!(10));
        let payload = EvaluationPayload {
            hedonic,
            jar: BTreeMap::new(),
        };

        let err = validate(&payload, &[], JarRangePolicy::Drop).unwrap_err();
        match err {
            Error::InvalidInput { field, reason } => {
                assert_eq!(field, "hedonic.aroma");
                assert!(reason.contains("between 1 and 9"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_out_of_range_jar_dropped_under_drop_policy() {
        let salt = attribute("Saltiness");
        let sweet = attribute("Sweetness");
        let payload = EvaluationPayload {
            hedonic: full_hedonic(),
            jar: [(salt.id, json!(6)), (sweet.id, json!(2))].into_iter().collect(),
        };

        let ratings = validate(&payload, &[salt.clone(), sweet.clone()], JarRangePolicy::Drop).unwrap();
        assert_eq!(ratings.jar.len(), 1);
        assert_eq!(ratings.jar[&sweet.id].value(), 2);
        assert_eq!(ratings.dropped.len(), 1);
        assert_eq!(ratings.dropped[0].attribute_id, salt.id);
        assert_eq!(ratings.dropped[0].value, json!(6));
    }

    #[test]
    fn test_out_of_range_jar_rejected_under_reject_policy() {
        let salt = attribute("Saltiness");
        let payload = EvaluationPayload {
            hedonic: full_hedonic(),
            jar: [(salt.id, json!(0))].into_iter().collect(),
        };

        let err = validate(&payload, &[salt], JarRangePolicy::Reject).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }

    #[test]
    fn test_unknown_jar_attribute_dropped() {
        let payload = EvaluationPayload {
            hedonic: full_hedonic(),
            jar: [(Uuid::new_v4(), json!(3))].into_iter().collect(),
        };

        let ratings = validate(&payload, &[], JarRangePolicy::Drop).unwrap();
        assert!(ratings.jar.is_empty());
        assert_eq!(ratings.dropped.len(), 1);
    }

    #[test]
    fn test_payload_deserializes_with_missing_sections() {
        let payload: EvaluationPayload =
            serde_json::from_str(r#"{"hedonic": {"appearance": 5}}"#).unwrap();
        assert_eq!(payload.hedonic.appearance, Some(json!(5)));
        assert!(payload.hedonic.overall.is_none());
        assert!(payload.jar.is_empty());
    }

    #[test]
    fn test_non_integer_hedonic_is_invalid_input() {
        for bad in [json!(7.5), json!("seven"), json!([7])] {
            let mut hedonic = full_hedonic();
            hedonic.flavor = Some(bad);
            let payload = EvaluationPayload {
                hedonic,
                jar: BTreeMap::new(),
            };

            match validate(&payload, &[], JarRangePolicy::Drop).unwrap_err() {
                Error::InvalidInput { field, reason } => {
                    assert_eq!(field, "hedonic.flavor");
                    assert!(reason.contains("integer between 1 and 9"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_null_hedonic_is_incomplete() {
        let payload: EvaluationPayload = serde_json::from_value(json!({
            "hedonic": { "appearance": 5, "aroma": 5, "flavor": null, "texture": 5, "overall": 5 }
        }))
        .unwrap();

        let err = validate(&payload, &[], JarRangePolicy::Drop).unwrap_err();
        assert!(matches!(err, Error::IncompleteSubmission(ref f) if f == "hedonic.flavor"));
    }

    #[test]
    fn test_non_integer_jar_follows_policy() {
        let salt = attribute("Saltiness");
        let payload = EvaluationPayload {
            hedonic: full_hedonic(),
            jar: [(salt.id, json!(3.5))].into_iter().collect(),
        };

        let ratings = validate(&payload, &[salt.clone()], JarRangePolicy::Drop).unwrap();
        assert!(ratings.jar.is_empty());
        assert_eq!(ratings.dropped[0].value, json!(3.5));
        assert!(ratings.dropped[0].reason.contains("integer"));

        let err = validate(&payload, &[salt.clone()], JarRangePolicy::Reject).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { ref field, .. } if *field == format!("jar.{}", salt.id)));
    }
}
