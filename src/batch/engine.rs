//! Batch Engine Module
//!
//! This module is responsible for sealing drained queue snapshots into batches.
//! Each batch is assigned a unique sequential ID and timestamp.

use crate::{Batch, PendingEntry};
use chrono::Utc;

/// Batch creation engine
///
/// Maintains a sequential batch ID counter.
pub struct BatchEngine {
    /// Next batch ID to assign (increments for each batch)
    next_batch_id: u64,
}

impl BatchEngine {
    /// Creates an engine whose first batch gets ID 1
    pub fn new() -> Self {
        Self::resume_after(0)
    }

    /// Creates an engine continuing a sequence whose last ID was `last_batch_id`
    pub fn resume_after(last_batch_id: u64) -> Self {
        Self {
            next_batch_id: last_batch_id + 1,
        }
    }

    /// Create a new batch from queue entries
    ///
    /// # Arguments
    /// * `entries` - Drained entries in queue order
    ///
    /// # Returns
    /// A sealed `Batch` ready to be submitted to the ledger
    pub fn create_batch(&mut self, entries: Vec<PendingEntry>) -> Batch {
        let batch = Batch {
            batch_id: self.next_batch_id,
            entries,
            created_at: Utc::now(),
        };

        self.next_batch_id += 1;
        batch
    }

    pub fn next_batch_id(&self) -> u64 {
        self.next_batch_id
    }
}

impl Default for BatchEngine {
    fn default() -> Self {
        Self::new()
    }
}
