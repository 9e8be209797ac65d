//! Dispatch Failure Handling Module
//!
//! Decides what happens to a batch whose submission failed as a whole, and
//! how long the dispatcher pauses before trying again.

use crate::PendingEntry;
use serde::Deserialize;
use tokio::time::{Duration, Instant};

/// What to do with the entries of a batch the ledger never executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Drop the whole batch, reporting every entry as a dead letter
    Discard,
    /// Put the batch back at the head of the queue until entries run out of attempts
    #[default]
    Retry,
}

impl FailurePolicy {
    /// Split a failed batch into entries to requeue and entries to drop
    ///
    /// Every entry's `attempts` counter is incremented first.
    ///
    /// # Arguments
    /// * `entries` - The failed batch, in batch order
    /// * `max_attempts` - Failed dispatches after which an entry is dropped
    ///
    /// # Returns
    /// `(requeue, dead_letters)`, both in batch order
    pub fn settle(self, entries: Vec<PendingEntry>, max_attempts: u32) -> (Vec<PendingEntry>, Vec<PendingEntry>) {
        let entries = entries.into_iter().map(|mut entry| {
            entry.attempts += 1;
            entry
        });

        match self {
            FailurePolicy::Discard => (Vec::new(), entries.collect()),
            FailurePolicy::Retry => entries.partition(|entry| entry.attempts < max_attempts),
        }
    }
}

/// Exponential pause after consecutive dispatch failures
///
/// The n-th consecutive failure blocks dispatch for `base * 2^(n-1)`, capped at `max`.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
    until: Option<Instant>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: 0,
            until: None,
        }
    }

    /// Record a failure and return the pause it imposes
    pub fn fail(&mut self, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let factor = 2u32.saturating_pow(self.failures - 1);
        let delay = self.base.saturating_mul(factor).min(self.max);
        self.until = Some(now + delay);
        delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.until = None;
    }

    /// Whether a tick at `now` falls inside the pause
    pub fn is_waiting(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now < until)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
