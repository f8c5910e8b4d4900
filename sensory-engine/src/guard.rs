//! In-process submission guard
//!
//! Keeps a set of `(evaluator, sample)` pairs whose submission is currently
//! being written. A double-click or client retry that arrives while the
//! first write is in flight is rejected without touching the store. The
//! store's unique constraint remains the authoritative duplicate check;
//! this only saves the redundant round trip.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use sensory_common::{Error, Result};
use tracing::debug;
use uuid::Uuid;

type Key = (Uuid, Uuid);

/// Shared registry of in-flight submissions
#[derive(Debug, Clone, Default)]
pub struct SubmissionGuard {
    in_flight: Arc<Mutex<HashSet<Key>>>,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the `(evaluator, sample)` pair
    ///
    /// Returns `SubmissionInFlight` if another caller holds it. The claim is
    /// released when the returned token is dropped, on every exit path.
    pub fn try_acquire(&self, evaluator_id: Uuid, sample_id: Uuid) -> Result<SubmissionToken> {
        let key = (evaluator_id, sample_id);
        if !self.lock().insert(key) {
            debug!(evaluator = %evaluator_id, sample = %sample_id, "Rejected duplicate in-flight submission");
            return Err(Error::SubmissionInFlight {
                evaluator: evaluator_id,
                sample: sample_id,
            });
        }

        Ok(SubmissionToken {
            key,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Release a claim explicitly (same as dropping the token)
    pub fn release(&self, token: SubmissionToken) {
        drop(token);
    }

    /// Number of submissions currently in flight
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Key>> {
        lock_set(&self.in_flight)
    }
}

// A panic while holding the lock cannot leave the set half-updated
// (single insert/remove), so a poisoned lock is still usable.
fn lock_set(set: &Mutex<HashSet<Key>>) -> MutexGuard<'_, HashSet<Key>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Proof of a claimed `(evaluator, sample)` pair; releases on drop
#[derive(Debug)]
pub struct SubmissionToken {
    key: Key,
    in_flight: Arc<Mutex<HashSet<Key>>>,
}

impl Drop for SubmissionToken {
    fn drop(&mut self) {
        lock_set(&self.in_flight).remove(&self.key);
    }
}
