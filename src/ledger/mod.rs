//! Execution Ledger Module
//!
//! The relay hub contract performs every forwarded call and owns the
//! per-signer sequence counters. This module describes it as a trait so the
//! dispatcher can run against the deployed contract over JSON-RPC or against
//! an in-memory ledger with the same contract.

mod memory;
mod rpc;
mod token;


pub use memory::{
    revert_payload, CallContext, CallTarget, MemoryLedger, ERROR_SELECTOR, NONCE_MISMATCH,
};
pub use rpc::RpcLedger;
pub use token::MemoryToken;

use crate::{error::LedgerError, ExecutionOutcome, ForwardRequest};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};

/// Boundary contract of the relay hub.
#[async_trait]
pub trait ExecutionLedger: Send + Sync {
    /// Signature-only check; never looks at the signer's counter.
    async fn verify(&self, request: &ForwardRequest, signature: &Bytes) -> Result<bool, LedgerError>;

    /// Execute a batch, isolating per-request failures.
    ///
    /// Fails as a whole, with no effects, when the caller is not the operator
    /// or when the two slices differ in length.
    async fn execute(
        &self,
        requests: &[ForwardRequest],
        signatures: &[Bytes],
    ) -> Result<ExecutionOutcome, LedgerError>;

    async fn get_nonce(&self, address: Address) -> Result<U256, LedgerError>;
}
