//! Error types for each stage of the relay pipeline.

use ethers::signers::WalletError;
use ethers::types::{Address, H256};
use thiserror::Error;

/// A submission that is not syntactically a signed forward request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("body is not valid JSON: {0}")]
    Json(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("`{0}` is not a well-formed address")]
    InvalidAddress(&'static str),

    #[error("`{0}` is not a non-negative 256-bit integer")]
    InvalidQuantity(&'static str),

    #[error("`{0}` is not a 0x-prefixed even-length hex string")]
    InvalidBytes(&'static str),

    #[error("signature must be 65 bytes, got {0}")]
    SignatureLength(usize),
}

/// Reasons a submission is turned away before it reaches the queue.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid request: {0}")]
    Decode(#[from] DecodeError),

    #[error("signature does not recover to the request sender")]
    InvalidSignature,

    #[error("ledger pre-check failed: {0}")]
    Ledger(#[from] LedgerError),
}

/// Failures of a whole ledger call. Per-request failures never surface here;
/// they are reported inside `ExecutionOutcome`.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("{requests} requests but {signatures} signatures")]
    LengthMismatch { requests: usize, signatures: usize },

    #[error("caller {0:?} is not the relay operator")]
    Unauthorized(Address),

    #[error("outcome not aligned with batch of {expected}: {successes} successes, {results} results")]
    MalformedOutcome {
        expected: usize,
        successes: usize,
        results: usize,
    },

    #[error("transaction {0:?} reverted")]
    Reverted(H256),

    /// The batch transaction was broadcast but its receipt never arrived, so
    /// the hub may or may not have executed it.
    #[error("outcome unknown: transaction {tx_hash:?} was broadcast but not confirmed ({reason})")]
    Unconfirmed { tx_hash: H256, reason: String },

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("ledger misconfigured: {0}")]
    Config(String),
}

/// A value list that does not fit the typed-data schema it is hashed under.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypedDataError {
    #[error("{schema} expects {expected} fields, got {got}")]
    Arity {
        schema: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{schema}.{field} has the wrong type")]
    KindMismatch {
        schema: &'static str,
        field: &'static str,
    },
}

/// Failure to produce a typed-data signature with a local key.
#[derive(Debug, Error)]
pub enum SignError {
    #[error(transparent)]
    TypedData(#[from] TypedDataError),

    #[error(transparent)]
    Wallet(#[from] WalletError),
}
