//! Next-sample resolution
//!
//! Pure functions over a randomization table and the set of samples the
//! evaluator has already rated. All session state lives in that set, so an
//! abandoned session resumes where it left off and repeated calls with the
//! same snapshot always agree.

use std::collections::HashSet;

use sensory_common::{Error, EvaluatorPosition, RandomizationEntry, RandomizationTable, Result};
use uuid::Uuid;

/// Outcome of resolving one product type for one evaluator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// The lowest-order entry not yet rated
    Next(&'a RandomizationEntry),
    /// Every sample in the evaluator's sequence has been rated
    Complete,
}

/// Find the first entry, by presentation order, whose sample is not in
/// `completed`
///
/// Fails with `NoAssignment` when the table has no row for `position`
/// (more evaluators than were provisioned).
pub fn resolve<'a>(
    position: EvaluatorPosition,
    table: &'a RandomizationTable,
    completed: &HashSet<Uuid>,
) -> Result<Resolution<'a>> {
    let sequence = table.sequence(position).ok_or(Error::NoAssignment {
        position: position.get(),
        rows: table.rows(),
    })?;

    let next = sequence
        .entries
        .iter()
        .filter(|entry| !completed.contains(&entry.sample_id))
        .min_by_key(|entry| entry.presentation_order);

    Ok(match next {
        Some(entry) => Resolution::Next(entry),
        None => Resolution::Complete,
    })
}
