//! Pending Queue Module
//!
//! This module implements the buffer of verified signed requests waiting for
//! the next batch dispatch. Requests are stored in a FIFO queue and drained
//! all at once by the batch dispatcher.

use crate::{PendingEntry, SignedRequest};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Queue of verified requests awaiting submission
///
/// Uses VecDeque for efficient insertion at the back and re-insertion at the front.
/// Every operation takes the write lock, so a `push` that arrives while a
/// `drain_all` holds it waits and lands in the queue left behind, ready for the
/// next snapshot.
pub struct PendingQueue {
    /// Pending entries in arrival order, protected by a read-write lock
    entries: RwLock<VecDeque<PendingEntry>>,
}

impl PendingQueue {
    /// Creates a new empty queue
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
        }
    }

    /// Add a verified request to the tail of the queue
    ///
    /// Called by the API server after a submission passes decoding and
    /// signature verification.
    pub async fn push(&self, signed: SignedRequest) {
        let mut entries = self.entries.write().await;
        entries.push_back(PendingEntry::new(signed));
    }

    /// Remove and return every queued entry as one snapshot
    ///
    /// Order is preserved so that several requests from one signer keep their
    /// nonce order inside the batch.
    ///
    /// # Returns
    /// All entries queued at the moment the lock was taken (possibly none)
    pub async fn drain_all(&self) -> Vec<PendingEntry> {
        let mut entries = self.entries.write().await;
        entries.drain(..).collect()
    }

    /// Put a batch that could not be submitted back at the head of the queue
    ///
    /// The entries keep their relative order and stay ahead of anything that
    /// arrived while the failed dispatch was in flight.
    ///
    /// # Arguments
    /// * `batch` - Entries in batch order
    pub async fn requeue_front(&self, batch: Vec<PendingEntry>) {
        let mut entries = self.entries.write().await;
        for entry in batch.into_iter().rev() {
            entries.push_front(entry);
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}
