use super::{revert_reason, ResultReporter};
use crate::{Batch, ExecutionOutcome, PendingEntry};
use async_trait::async_trait;
use tracing::{error, info};

/// Writes one log line per executed request, and one per dead letter.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

#[async_trait]
impl ResultReporter for LogReporter {
    async fn report(&self, batch: &Batch, outcome: &ExecutionOutcome) {
        info!(
            "Batch #{} executed: {}/{} requests succeeded (tx {:?})",
            batch.batch_id,
            outcome.success_count(),
            batch.len(),
            outcome.tx_hash
        );

        for (index, (entry, (success, result))) in batch.entries.iter().zip(outcome.iter()).enumerate() {
            let request = &entry.signed.request;
            let status = if success { "Success" } else { "Fail" };
            match revert_reason(result).filter(|_| !success) {
                Some(reason) => info!(
                    "Request #{} from {:?} (nonce {}): {} - {}",
                    index + 1,
                    request.from,
                    request.nonce,
                    status,
                    reason
                ),
                None => info!(
                    "Request #{} from {:?} (nonce {}): {} - return data {}",
                    index + 1,
                    request.from,
                    request.nonce,
                    status,
                    result
                ),
            }
        }
    }

    async fn report_dead_letters(&self, batch_id: u64, entries: &[PendingEntry], reason: &str) {
        for entry in entries {
            let request = &entry.signed.request;
            error!(
                "Dropped request from {:?} (nonce {}) after {} attempts in batch #{}: {}",
                request.from, request.nonce, entry.attempts, batch_id, reason
            );
        }
    }
}
