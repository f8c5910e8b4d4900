//! Report aggregation
//!
//! Pure reductions over the full evaluation set of one product type,
//! recomputed on every request. Sizes are bounded by 12 samples x 12
//! evaluators, so there is nothing to maintain incrementally.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use sensory_common::ratings::JAR_POINTS;
use sensory_common::{Evaluation, HedonicAttribute, JarAttribute, JarScore, Sample};
use uuid::Uuid;

/// Mean rating per hedonic attribute
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HedonicMeans {
    pub appearance: f64,
    pub aroma: f64,
    pub flavor: f64,
    pub texture: f64,
    pub overall: f64,
}

impl HedonicMeans {
    fn set(&mut self, attribute: HedonicAttribute, value: f64) {
        match attribute {
            HedonicAttribute::Appearance => self.appearance = value,
            HedonicAttribute::Aroma => self.aroma = value,
            HedonicAttribute::Flavor => self.flavor = value,
            HedonicAttribute::Texture => self.texture = value,
            HedonicAttribute::Overall => self.overall = value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HedonicSampleSummary {
    pub sample_id: Uuid,
    pub brand: String,
    pub retailer_code: String,
    pub blind_code: Option<String>,
    pub ratings_count: usize,
    pub means: HedonicMeans,
}

/// Per-sample hedonic means for one product type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HedonicReport {
    pub product_type_id: Uuid,
    pub samples: BTreeMap<Uuid, HedonicSampleSummary>,
}

/// 5-bucket frequency distribution and mean of one sample's JAR ratings
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JarTally {
    pub ratings: Vec<i64>,
    /// `distribution[k]` counts ratings equal to `k + 1`
    pub distribution: [u32; JAR_POINTS],
    pub mean: f64,
}

impl JarTally {
    /// Tally raw values, ignoring anything outside 1..=5
    pub fn from_raw(values: impl IntoIterator<Item = i64>) -> Self {
        let scores: Vec<JarScore> = values
            .into_iter()
            .filter_map(|v| JarScore::try_from(v).ok())
            .collect();

        let mut distribution = [0u32; JAR_POINTS];
        for score in &scores {
            distribution[score.bucket()] += 1;
        }
        let ratings: Vec<i64> = scores.iter().map(|&s| i64::from(s.value())).collect();

        let mean = mean(ratings.iter().map(|&v| v as f64));
        Self {
            ratings,
            distribution,
            mean,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JarAttributeReport {
    pub attribute_id: Uuid,
    pub name: String,
    pub labels: [String; JAR_POINTS],
    pub samples: BTreeMap<Uuid, JarTally>,
}

/// Per-attribute, per-sample JAR distributions for one product type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JarReport {
    pub product_type_id: Uuid,
    pub attributes: BTreeMap<Uuid, JarAttributeReport>,
}

/// Arithmetic mean, 0.0 for no values
pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Keep the first evaluation per (evaluator, sample)
///
/// The store already enforces uniqueness; this keeps a report correct even
/// when fed a set assembled from elsewhere.
fn distinct(evaluations: &[Evaluation]) -> Vec<&Evaluation> {
    let mut seen = HashSet::new();
    evaluations
        .iter()
        .filter(|e| seen.insert((e.evaluator_id, e.sample_id)))
        .collect()
}

/// Mean of each hedonic attribute per sample
///
/// Every sample in `samples` is reported, with zero means if unrated.
/// Evaluations for samples not in `samples` are ignored.
pub fn hedonic_report(
    product_type_id: Uuid,
    samples: &[Sample],
    evaluations: &[Evaluation],
) -> HedonicReport {
    let evaluations = distinct(evaluations);

    let samples = samples
        .iter()
        .map(|sample| {
            let rated: Vec<&Evaluation> = evaluations
                .iter()
                .copied()
                .filter(|e| e.sample_id == sample.id)
                .collect();

            let mut means = HedonicMeans::default();
            for attribute in HedonicAttribute::ALL {
                let value = mean(rated.iter().map(|e| e.hedonic.get(attribute).value() as f64));
                means.set(attribute, value);
            }

            let summary = HedonicSampleSummary {
                sample_id: sample.id,
                brand: sample.brand.clone(),
                retailer_code: sample.retailer_code.clone(),
                blind_code: sample.blind_code.clone(),
                ratings_count: rated.len(),
                means,
            };
            (sample.id, summary)
        })
        .collect();

    HedonicReport {
        product_type_id,
        samples,
    }
}

/// JAR distribution and mean per attribute and sample
pub fn jar_report(
    product_type_id: Uuid,
    attributes: &[JarAttribute],
    samples: &[Sample],
    evaluations: &[Evaluation],
) -> JarReport {
    let evaluations = distinct(evaluations);

    let attributes = attributes
        .iter()
        .map(|attribute| {
            let per_sample = samples
                .iter()
                .map(|sample| {
                    let values = evaluations
                        .iter()
                        .filter(|e| e.sample_id == sample.id)
                        .filter_map(|e| e.jar.get(&attribute.id))
                        .map(|&score| i64::from(score));
                    (sample.id, JarTally::from_raw(values))
                })
                .collect();

            let report = JarAttributeReport {
                attribute_id: attribute.id,
                name: attribute.name.clone(),
                labels: attribute.labels.clone(),
                samples: per_sample,
            };
            (attribute.id, report)
        })
        .collect();

    JarReport {
        product_type_id,
        attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sensory_common::{HedonicScale, HedonicScore, JarScore};

    fn sample(brand: &str) -> Sample {
        Sample {
            id: Uuid::new_v4(),
            product_type_id: Uuid::nil(),
            brand: brand.to_string(),
            retailer_code: format!("{}-R", brand),
            blind_code: Some("512".to_string()),
        }
    }

    fn scale(all: i64) -> HedonicScale {
        let s = HedonicScore::try_from(all).unwrap();
        HedonicScale {
            appearance: s,
            aroma: s,
            flavor: s,
            texture: s,
            overall: s,
        }
    }

    fn evaluation(evaluator: Uuid, sample: Uuid, hedonic: HedonicScale) -> Evaluation {
        Evaluation {
            id: Uuid::new_v4(),
            event_id: Uuid::nil(),
            product_type_id: Uuid::nil(),
            sample_id: sample,
            evaluator_id: evaluator,
            hedonic,
            jar: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_hedonic_mean_is_exact() {
        let s = sample("Acme");
        let evaluations: Vec<Evaluation> = [9, 7, 8]
            .into_iter()
            .map(|v| evaluation(Uuid::new_v4(), s.id, scale(v)))
            .collect();

        let report = hedonic_report(Uuid::nil(), &[s.clone()], &evaluations);
        let summary = &report.samples[&s.id];
        assert_eq!(summary.ratings_count, 3);
        assert_eq!(summary.means.overall, 8.0);
        assert_eq!(summary.means.appearance, 8.0);
        assert_eq!(summary.brand, "Acme");
    }

    #[test]
    fn test_unrated_sample_has_zero_means() {
        let rated = sample("A");
        let unrated = sample("B");
        let evaluations = vec![evaluation(Uuid::new_v4(), rated.id, scale(6))];

        let report = hedonic_report(Uuid::nil(), &[rated.clone(), unrated.clone()], &evaluations);
        assert_eq!(report.samples.len(), 2);
        assert_eq!(report.samples[&unrated.id].ratings_count, 0);
        assert_eq!(report.samples[&unrated.id].means, HedonicMeans::default());
    }

    #[test]
    fn test_attributes_averaged_independently() {
        let s = sample("A");
        let mut first = scale(5);
        first.aroma = HedonicScore::try_from(9).unwrap();
        let second = scale(3);
        let evaluations = vec![
            evaluation(Uuid::new_v4(), s.id, first),
            evaluation(Uuid::new_v4(), s.id, second),
        ];

        let means = hedonic_report(Uuid::nil(), &[s.clone()], &evaluations).samples[&s.id].means;
        assert_eq!(means.aroma, 6.0);
        assert_eq!(means.flavor, 4.0);
    }

    #[test]
    fn test_repeated_pair_counted_once() {
        let s = sample("A");
        let evaluator = Uuid::new_v4();
        let evaluations = vec![
            evaluation(evaluator, s.id, scale(9)),
            evaluation(evaluator, s.id, scale(1)),
        ];

        let report = hedonic_report(Uuid::nil(), &[s.clone()], &evaluations);
        assert_eq!(report.samples[&s.id].ratings_count, 1);
        assert_eq!(report.samples[&s.id].means.overall, 9.0);
    }

    #[test]
    fn test_jar_tally_distribution_and_mean() {
        let tally = JarTally::from_raw([1, 3, 3, 5]);
        assert_eq!(tally.distribution, [1, 0, 2, 0, 1]);
        assert_eq!(tally.mean, 3.0);
    }

    #[test]
    fn test_jar_tally_ignores_out_of_range() {
        let tally = JarTally::from_raw([0, 2, 6, 4, -3]);
        assert_eq!(tally.ratings, vec![2, 4]);
        assert_eq!(tally.distribution, [0, 1, 0, 1, 0]);
        assert_eq!(tally.mean, 3.0);

        let empty = JarTally::from_raw([]);
        assert_eq!(empty.mean, 0.0);
        assert_eq!(empty.distribution, [0; 5]);
    }

    #[test]
    fn test_jar_report_per_attribute_per_sample() {
        let a = sample("A");
        let b = sample("B");
        let sweet = JarAttribute {
            id: Uuid::new_v4(),
            product_type_id: Uuid::nil(),
            name: "Sweetness".into(),
            labels: ["1".into(), "2".into(), "3".into(), "4".into(), "5".into()],
            display_order: 0,
        };

        let evaluations: Vec<Evaluation> = [1, 3, 3, 5]
            .into_iter()
            .map(|v| {
                let mut e = evaluation(Uuid::new_v4(), a.id, scale(5));
                e.jar.insert(sweet.id, JarScore::try_from(v).unwrap());
                e
            })
            .collect();

        let report = jar_report(Uuid::nil(), &[sweet.clone()], &[a.clone(), b.clone()], &evaluations);
        let attr = &report.attributes[&sweet.id];
        assert_eq!(attr.name, "Sweetness");
        assert_eq!(attr.samples[&a.id].distribution, [1, 0, 2, 0, 1]);
        assert_eq!(attr.samples[&a.id].mean, 3.0);
        assert_eq!(attr.samples[&b.id].ratings, Vec::<i64>::new());
        assert_eq!(attr.samples[&b.id].mean, 0.0);
    }
}
