//! Bounded rating values
//!
//! Hedonic ratings use a 9-point liking scale, just-about-right (JAR)
//! ratings a 5-point scale centred on 3. Both are only constructible
//! through `TryFrom`, so any value held by the engine is in range.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Lowest and highest hedonic rating
pub const HEDONIC_MIN: i64 = 1;
pub const HEDONIC_MAX: i64 = 9;

/// Lowest and highest JAR rating
pub const JAR_MIN: i64 = 1;
pub const JAR_MAX: i64 = 5;

/// Number of JAR buckets (one per scale point)
pub const JAR_POINTS: usize = 5;

/// A hedonic rating in 1..=9
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct HedonicScore(u8);

impl HedonicScore {
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for HedonicScore {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        if (HEDONIC_MIN..=HEDONIC_MAX).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(Error::invalid(
                "hedonic",
                format!("must be between {HEDONIC_MIN} and {HEDONIC_MAX}, got {value}"),
            ))
        }
    }
}

impl From<HedonicScore> for i64 {
    fn from(score: HedonicScore) -> Self {
        score.0 as i64
    }
}

/// A just-about-right rating in 1..=5 (3 = just about right)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct JarScore(u8);

impl JarScore {
    pub fn value(self) -> u8 {
        self.0
    }

    /// Zero-based bucket index in a 5-point distribution
    pub fn bucket(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl TryFrom<i64> for JarScore {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        if (JAR_MIN..=JAR_MAX).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(Error::invalid(
                "jar",
                format!("must be between {JAR_MIN} and {JAR_MAX}, got {value}"),
            ))
        }
    }
}

impl From<JarScore> for i64 {
    fn from(score: JarScore) -> Self {
        score.0 as i64
    }
}

/// The five attributes rated on the hedonic scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HedonicAttribute {
    Appearance,
    Aroma,
    Flavor,
    Texture,
    Overall,
}

impl HedonicAttribute {
    /// All attributes in questionnaire order
    pub const ALL: [HedonicAttribute; 5] = [
        HedonicAttribute::Appearance,
        HedonicAttribute::Aroma,
        HedonicAttribute::Flavor,
        HedonicAttribute::Texture,
        HedonicAttribute::Overall,
    ];

    /// Column / field name
    pub fn name(self) -> &'static str {
        match self {
            HedonicAttribute::Appearance => "appearance",
            HedonicAttribute::Aroma => "aroma",
            HedonicAttribute::Flavor => "flavor",
            HedonicAttribute::Texture => "texture",
            HedonicAttribute::Overall => "overall",
        }
    }
}

/// One evaluator's complete hedonic ratings for one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HedonicScale {
    pub appearance: HedonicScore,
    pub aroma: HedonicScore,
    pub flavor: HedonicScore,
    pub texture: HedonicScore,
    pub overall: HedonicScore,
}

impl HedonicScale {
    pub fn get(&self, attribute: HedonicAttribute) -> HedonicScore {
        match attribute {
            HedonicAttribute::Appearance => self.appearance,
            HedonicAttribute::Aroma => self.aroma,
            HedonicAttribute::Flavor => self.flavor,
            HedonicAttribute::Texture => self.texture,
            HedonicAttribute::Overall => self.overall,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hedonic_bounds() {
        assert!(HedonicScore::try_from(0).is_err());
        assert_eq!(HedonicScore::try_from(1).unwrap().value(), 1);
        assert_eq!(HedonicScore::try_from(9).unwrap().value(), 9);
        assert!(HedonicScore::try_from(10).is_err());
    }

    #[test]
    fn test_jar_bounds_and_bucket() {
        assert!(JarScore::try_from(0).is_err());
        assert!(JarScore::try_from(6).is_err());
        assert_eq!(JarScore::try_from(1).unwrap().bucket(), 0);
        assert_eq!(JarScore::try_from(5).unwrap().bucket(), 4);
    }

    #[test]
    fn test_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<HedonicScore>("7").is_ok());
        assert!(serde_json::from_str::<HedonicScore>("11").is_err());
        assert!(serde_json::from_str::<JarScore>("-1").is_err());
    }

    #[test]
    fn test_attribute_names_follow_questionnaire_order() {
        let names: Vec<_> = HedonicAttribute::ALL.iter().map(|a| a.name()).collect();
        assert_eq!(names, ["appearance", "aroma", "flavor", "texture", "overall"]);
    }
}
