//! Gasless meta-transaction relayer.
//!
//! Users sign EIP-712 forward requests off-chain; the relayer checks the
//! signatures, queues the requests, and periodically submits everything queued
//! to a relay hub contract as one batch, paying the gas itself.

pub mod types; // Forward requests, queue entries, batches and execution outcomes.
pub mod error; // Error types per pipeline stage.
pub mod api; // HTTP endpoints for submissions and lookups.
pub mod codec; // JSON body decoding of submissions.
pub mod validation; // EIP-712 typed data hashing and signature recovery.
pub mod pool; // Pending queue of admitted requests.
pub mod ledger; // Relay hub boundary: RPC client and in-memory hub.
pub mod batch; // Periodic batch dispatch and failure policy.
pub mod report; // Sinks for batch outcomes.
pub mod registry; // SQLite registry of executed batches.
pub mod config; // Defines and loads relayer configuration.

#[cfg(test)]
mod test_utils;

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use config::Config;
pub use batch::BatchDispatcher;
