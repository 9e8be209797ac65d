//! Result Reporting Module
//!
//! Once a batch has been executed, the per-request outcomes are only visible
//! to the operator: the submitting HTTP caller was answered at admission time.
//! Reporters are the sinks for those outcomes, and for requests that were
//! dropped because their batch could never be submitted.

mod log;

pub use log::LogReporter;

use crate::{ledger::ERROR_SELECTOR, Batch, ExecutionOutcome, PendingEntry};
use async_trait::async_trait;
use ethers::abi::{decode, ParamType};

/// Sink for batch outcomes
///
/// Reporters must not fail the dispatch: implementations log their own errors.
#[async_trait]
pub trait ResultReporter: Send + Sync {
    /// Surface each request's success flag and return/revert payload.
    ///
    /// `outcome` is index-aligned with `batch.entries`.
    async fn report(&self, batch: &Batch, outcome: &ExecutionOutcome);

    /// Surface requests that were dropped without being executed.
    async fn report_dead_letters(&self, batch_id: u64, entries: &[PendingEntry], reason: &str);
}

/// Decode the reason string of a Solidity `Error(string)` revert payload.
pub fn revert_reason(payload: &[u8]) -> Option<String> {
    let body = payload.strip_prefix(&ERROR_SELECTOR[..])?;
    let mut tokens = decode(&[ParamType::String], body).ok()?;
    tokens.pop()?.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::revert_payload;

    #[test]
    fn test_revert_reason_round_trips_error_string() {
        let payload = revert_payload("ERC20: insufficient allowance");
        assert_eq!(revert_reason(&payload).as_deref(), Some("ERC20: insufficient allowance"));
    }

    #[test]
    fn test_revert_reason_ignores_other_payloads() {
        assert_eq!(revert_reason(&[]), None);
        assert_eq!(revert_reason(&[0x4e, 0x48, 0x7b, 0x71, 0, 0]), None);
        assert_eq!(revert_reason(&ERROR_SELECTOR), None);
    }
}
