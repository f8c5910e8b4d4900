//! Randomization builder
//!
//! Turns the samples of one product type into a [`RandomizationTable`]:
//! every evaluator position gets its own presentation order, taken from a
//! row of the cyclic Latin square, and every sample gets a fresh blind code.
//!
//! Position `p` uses row `(p - 1) mod S` of the order-`S` square, so with
//! at least `S` evaluator slots each sample occupies each presentation
//! order at least once, and when `S` divides the slot count exactly
//! `slots / S` times.

use chrono::Utc;
use rand::Rng;
use sensory_common::models::MAX_POSITIONS;
use sensory_common::{
    Error, EvaluatorPosition, EvaluatorSequence, RandomizationEntry, RandomizationTable, Result,
    Sample,
};
use tracing::warn;
use uuid::Uuid;

use crate::latin_square;

/// Smallest and largest blind code handed out
pub const BLIND_CODE_MIN: usize = 101;
pub const BLIND_CODE_MAX: usize = 999;

/// A table ready to persist together with the blind codes it references
#[derive(Debug, Clone)]
pub struct RandomizationPlan {
    pub table: RandomizationTable,
    /// `(sample_id, blind_code)` for every sample of the product type
    pub blind_codes: Vec<(Uuid, String)>,
}

/// Build the presentation table for `samples` across `evaluator_slots`
/// positions
///
/// Fails with `InvalidInput` for an empty sample list, more than 12
/// samples, or a slot count outside `1..=12`.
pub fn build_plan<R: Rng + ?Sized>(
    product_type_id: Uuid,
    samples: &[Sample],
    evaluator_slots: u8,
    rng: &mut R,
) -> Result<RandomizationPlan> {
    let sample_count = samples.len();
    if sample_count == 0 {
        return Err(Error::invalid("samples", "at least one sample is required"));
    }
    if sample_count > MAX_POSITIONS as usize {
        return Err(Error::invalid(
            "samples",
            format!(
                "at most {} samples can be balanced across evaluator positions, got {}",
                MAX_POSITIONS, sample_count
            ),
        ));
    }
    if !(1..=MAX_POSITIONS).contains(&evaluator_slots) {
        return Err(Error::invalid(
            "evaluator_slots",
            format!("must be between 1 and {}, got {}", MAX_POSITIONS, evaluator_slots),
        ));
    }
    if sample_count > evaluator_slots as usize {
        warn!(
            product_type = %product_type_id,
            samples = sample_count,
            evaluator_slots,
            "Fewer evaluator slots than samples; not every sample will be served at every position"
        );
    }

    let codes = draw_blind_codes(sample_count, rng);
    let square = latin_square::generate(sample_count);

    let sequences = (1..=evaluator_slots)
        .map(|p| {
            let position = EvaluatorPosition::new(p)?;
            let row = &square[position.index() % sample_count];
            let entries = row
                .iter()
                .enumerate()
                .map(|(slot, &latin_value)| {
                    let sample_index = latin_value - 1;
                    RandomizationEntry {
                        sample_id: samples[sample_index].id,
                        blind_code: codes[sample_index].clone(),
                        presentation_order: slot as u32 + 1,
                    }
                })
                .collect();
            Ok(EvaluatorSequence { position, entries })
        })
        .collect::<Result<Vec<_>>>()?;

    let blind_codes = samples
        .iter()
        .zip(codes)
        .map(|(sample, code)| (sample.id, code))
        .collect();

    Ok(RandomizationPlan {
        table: RandomizationTable {
            product_type_id,
            sequences,
            created_at: Utc::now(),
        },
        blind_codes,
    })
}

/// Draw `count` distinct 3-digit codes uniformly from 101..=999
///
/// Codes are random rather than sequential so they carry no information
/// about brand, retailer or entry order.
pub fn draw_blind_codes<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<String> {
    let range = BLIND_CODE_MAX - BLIND_CODE_MIN + 1;
    rand::seq::index::sample(rng, range, count.min(range))
        .into_iter()
        .map(|offset| (BLIND_CODE_MIN + offset).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn samples(n: usize) -> Vec<Sample> {
        let product_type_id = Uuid::new_v4();
        (0..n)
            .map(|i| Sample {
                id: Uuid::new_v4(),
                product_type_id,
                brand: format!("Brand {}", i),
                retailer_code: format!("R{}", i),
                blind_code: None,
            })
            .collect()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_every_sequence_is_a_permutation() {
        for n in 1..=12 {
            let samples = samples(n);
            let plan = build_plan(Uuid::new_v4(), &samples, 12, &mut rng()).unwrap();
            assert_eq!(plan.table.rows(), 12);

            let expected: HashSet<Uuid> = samples.iter().map(|s| s.id).collect();
            for seq in &plan.table.sequences {
                let ids: Vec<Uuid> = seq.entries.iter().map(|e| e.sample_id).collect();
                let unique: HashSet<Uuid> = ids.iter().copied().collect();
                assert_eq!(ids.len(), n, "position {}", seq.position.get());
                assert_eq!(unique, expected, "position {}", seq.position.get());

                let orders: Vec<u32> = seq.entries.iter().map(|e| e.presentation_order).collect();
                assert_eq!(orders, (1..=n as u32).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_every_sample_covers_every_order() {
        for n in 1..=12 {
            let samples = samples(n);
            let plan = build_plan(Uuid::new_v4(), &samples, 12, &mut rng()).unwrap();

            for order in 1..=n as u32 {
                let at_order: HashSet<Uuid> = plan
                    .table
                    .sequences
                    .iter()
                    .flat_map(|seq| seq.entries.iter())
                    .filter(|e| e.presentation_order == order)
                    .map(|e| e.sample_id)
                    .collect();
                assert_eq!(at_order.len(), n, "n={} order={}", n, order);
            }
        }
    }

    #[test]
    fn test_exact_balance_when_samples_divide_slots() {
        let samples = samples(4);
        let plan = build_plan(Uuid::new_v4(), &samples, 12, &mut rng()).unwrap();

        for order in 1..=4u32 {
            for sample in &samples {
                let count = plan
                    .table
                    .sequences
                    .iter()
                    .filter(|seq| {
                        seq.entries
                            .iter()
                            .any(|e| e.presentation_order == order && e.sample_id == sample.id)
                    })
                    .count();
                assert_eq!(count, 3);
            }
        }
    }

    #[test]
    fn test_neighbouring_positions_are_rotations() {
        let samples = samples(3);
        let plan = build_plan(Uuid::new_v4(), &samples, 12, &mut rng()).unwrap();
        let first: Vec<Uuid> = plan.table.sequences[0].entries.iter().map(|e| e.sample_id).collect();
        let second: Vec<Uuid> = plan.table.sequences[1].entries.iter().map(|e| e.sample_id).collect();
        let fourth: Vec<Uuid> = plan.table.sequences[3].entries.iter().map(|e| e.sample_id).collect();

        assert_eq!(second, vec![first[1], first[2], first[0]]);
        assert_eq!(fourth, first);
    }

    #[test]
    fn test_blind_codes_unique_and_consistent() {
        let samples = samples(12);
        let plan = build_plan(Uuid::new_v4(), &samples, 12, &mut rng()).unwrap();

        let codes: HashSet<&str> = plan.blind_codes.iter().map(|(_, c)| c.as_str()).collect();
        assert_eq!(codes.len(), 12);
        for (_, code) in &plan.blind_codes {
            let value: usize = code.parse().unwrap();
            assert!((BLIND_CODE_MIN..=BLIND_CODE_MAX).contains(&value));
        }

        for entry in plan.table.sequences.iter().flat_map(|s| s.entries.iter()) {
            let (_, code) = plan
                .blind_codes
                .iter()
                .find(|(id, _)| *id == entry.sample_id)
                .unwrap();
            assert_eq!(&entry.blind_code, code);
        }
    }

    #[test]
    fn test_rejects_bad_sample_counts() {
        let err = build_plan(Uuid::new_v4(), &[], 12, &mut rng()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { ref field, .. } if field == "samples"));

        let err = build_plan(Uuid::new_v4(), &samples(13), 12, &mut rng()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }

    #[test]
    fn test_rejects_bad_slot_counts() {
        assert!(build_plan(Uuid::new_v4(), &samples(2), 0, &mut rng()).is_err());
        assert!(build_plan(Uuid::new_v4(), &samples(2), 13, &mut rng()).is_err());
        let plan = build_plan(Uuid::new_v4(), &samples(2), 6, &mut rng()).unwrap();
        assert_eq!(plan.table.rows(), 6);
    }
}
