//! Batch Dispatcher Module
//!
//! This module implements the background loop that periodically drains the
//! pending queue and submits everything in it to the relay hub as one batch.
//!
//! # Tick Flow
//! 1. Skip if a dispatch is already in flight
//! 2. Defer if inside the backoff window of a previous failure
//! 3. Drain the queue; do nothing if it was empty
//! 4. Seal the entries into a batch via `BatchEngine`
//! 5. Submit the index-aligned request/signature arrays to the ledger
//! 6. Hand the outcome to every reporter, or apply the failure policy

use crate::{
    batch::{Backoff, BatchEngine, FailurePolicy},
    config::BatchConfig,
    error::LedgerError,
    ledger::ExecutionLedger,
    pool::PendingQueue,
    report::ResultReporter,
    Batch,
};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Queue was empty
    Idle,
    /// Another dispatch was in flight
    Skipped,
    /// Inside the backoff window after a failure
    Deferred,
    Dispatched {
        batch_id: u64,
        size: usize,
        successes: usize,
    },
    /// The ledger call could not be completed
    Failed {
        batch_id: u64,
        requeued: usize,
        dead_lettered: usize,
    },
}

/// Batch dispatcher
///
/// The only caller of `ExecutionLedger::execute`. At most one dispatch is in
/// flight at any time; a tick that observes one is skipped rather than queued.
pub struct BatchDispatcher {
    /// Verified requests waiting for the next batch
    queue: Arc<PendingQueue>,
    /// Relay hub the batches are submitted to
    ledger: Arc<dyn ExecutionLedger>,
    /// Sinks for batch outcomes and dead letters
    reporters: Vec<Arc<dyn ResultReporter>>,
    /// Batch ID sequence
    engine: Mutex<BatchEngine>,
    backoff: Mutex<Backoff>,
    /// Held for the duration of a dispatch
    in_flight: Mutex<()>,
    config: BatchConfig,
}

impl BatchDispatcher {
    /// Creates a new batch dispatcher
    ///
    /// # Arguments
    /// * `queue` - Shared reference to the pending queue the API server pushes to
    /// * `ledger` - Relay hub client acting as the operator
    /// * `reporters` - Outcome sinks, called in order after every batch
    /// * `config` - Interval and failure policy settings
    pub fn new(
        queue: Arc<PendingQueue>,
        ledger: Arc<dyn ExecutionLedger>,
        reporters: Vec<Arc<dyn ResultReporter>>,
        config: BatchConfig,
    ) -> Self {
        let backoff = Backoff::new(
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        );

        Self {
            queue,
            ledger,
            reporters,
            engine: Mutex::new(BatchEngine::new()),
            backoff: Mutex::new(backoff),
            in_flight: Mutex::new(()),
            config,
        }
    }

    /// Continue batch numbering after `last_batch_id` (e.g. the last one recorded in the registry)
    pub fn resume_after(mut self, last_batch_id: u64) -> Self {
        self.engine = Mutex::new(BatchEngine::resume_after(last_batch_id));
        self
    }

    /// Run the dispatch loop until `shutdown` turns true or its sender is dropped
    ///
    /// Each tick is awaited inline, so shutdown is only observed between
    /// dispatches and an in-flight batch always completes. One final flush of
    /// the queue is performed before returning.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Batch dispatcher starting: interval={}ms, on_failure={:?}, max_attempts={}",
            self.config.timeout_interval_ms, self.config.on_failure, self.config.max_attempts
        );

        let mut ticker = interval(Duration::from_millis(self.config.timeout_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Batch dispatcher stopping, flushing {} queued requests", self.queue.len().await);
        if let TickOutcome::Failed { requeued, .. } = self.flush().await {
            if requeued > 0 {
                warn!("{} requests left unsubmitted at shutdown", requeued);
            }
        }
    }

    /// Perform one scheduled dispatch attempt
    pub async fn tick(&self) -> TickOutcome {
        self.dispatch(false).await
    }

    /// Dispatch whatever is queued, ignoring any backoff window
    pub async fn flush(&self) -> TickOutcome {
        self.dispatch(true).await
    }

    async fn dispatch(&self, ignore_backoff: bool) -> TickOutcome {
        let Ok(_in_flight) = self.in_flight.try_lock() else {
            debug!("Dispatch still in flight, skipping tick");
            return TickOutcome::Skipped;
        };

        if !ignore_backoff && self.backoff.lock().await.is_waiting(Instant::now()) {
            debug!("Backing off after failed dispatch, deferring tick");
            return TickOutcome::Deferred;
        }

        let entries = self.queue.drain_all().await;
        if entries.is_empty() {
            debug!("No pending requests");
            return TickOutcome::Idle;
        }

        let batch = self.engine.lock().await.create_batch(entries);
        let (requests, signatures) = batch.split();
        info!("Dispatching batch #{} with {} requests", batch.batch_id, batch.len());

        let result = self
            .ledger
            .execute(&requests, &signatures)
            .await
            .and_then(|outcome| outcome.ensure_aligned(batch.len()).map(|_| outcome));

        match result {
            Ok(outcome) => {
                self.backoff.lock().await.reset();
                for reporter in &self.reporters {
                    reporter.report(&batch, &outcome).await;
                }
                TickOutcome::Dispatched {
                    batch_id: batch.batch_id,
                    size: batch.len(),
                    successes: outcome.success_count(),
                }
            }
            Err(e) => self.fail(batch, e).await,
        }
    }

    /// Apply the failure policy to a batch whose submission failed
    ///
    /// A batch whose outcome is unknown is always dead-lettered, whatever the policy.
    async fn fail(&self, batch: Batch, cause: LedgerError) -> TickOutcome {
        let delay = self.backoff.lock().await.fail(Instant::now());
        error!(
            "Batch #{} with {} requests failed: {} (next attempt in {:?})",
            batch.batch_id,
            batch.len(),
            cause,
            delay
        );

        let batch_id = batch.batch_id;
        // a broadcast batch may have executed; resubmitting it would replay every nonce
        let policy = match cause {
            LedgerError::Unconfirmed { .. } => FailurePolicy::Discard,
            _ => self.config.on_failure,
        };
        let (requeue, dead) = policy.settle(batch.entries, self.config.max_attempts);
        let (requeued, dead_lettered) = (requeue.len(), dead.len());

        if !requeue.is_empty() {
            self.queue.requeue_front(requeue).await;
        }
        if !dead.is_empty() {
            let reason = cause.to_string();
            for reporter in &self.reporters {
                reporter.report_dead_letters(batch_id, &dead, &reason).await;
            }
        }

        TickOutcome::Failed {
            batch_id,
            requeued,
            dead_lettered,
        }
    }
}
