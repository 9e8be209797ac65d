use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Call a signer authorizes the relay hub to perform on its behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas: U256,
    pub nonce: U256,
    pub data: Bytes,
}

/// Forward request paired with its 65-byte `r || s || v` signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    pub request: ForwardRequest,
    pub signature: Bytes,
}

/// EIP-2612 allowance grant, signed under the token's own domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permit {
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    pub nonce: U256,
    pub deadline: U256,
}

/// A signed request waiting in the pending queue
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub signed: SignedRequest,
    /// Number of dispatches of this entry that failed as a whole
    pub attempts: u32,
    pub received_at: DateTime<Utc>,
}

impl PendingEntry {
    pub fn new(signed: SignedRequest) -> Self {
        Self {
            signed,
            attempts: 0,
            received_at: Utc::now(),
        }
    }
}

/// Drained snapshot of the queue, ready to be submitted as one call
#[derive(Debug, Clone)]
pub struct Batch {
    pub batch_id: u64,
    pub entries: Vec<PendingEntry>,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Split into the index-aligned `requests[]` / `signatures[]` pair the hub expects.
    pub fn split(&self) -> (Vec<ForwardRequest>, Vec<Bytes>) {
        self.entries
            .iter()
            .map(|entry| (entry.signed.request.clone(), entry.signed.signature.clone()))
            .unzip()
    }
}

/// Per-request outcome of `execute`, index-aligned with the submitted batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub successes: Vec<bool>,
    pub results: Vec<Bytes>,
    /// Hash of the submitting transaction when the ledger is remote
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<H256>,
}

impl ExecutionOutcome {
    pub fn len(&self) -> usize {
        self.successes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.successes.iter().filter(|ok| **ok).count()
    }

    pub fn push(&mut self, success: bool, result: Bytes) {
        self.successes.push(success);
        self.results.push(result);
    }

    /// Reject outcomes that cannot be lined up with a batch of `expected` requests.
    pub fn ensure_aligned(&self, expected: usize) -> Result<(), LedgerError> {
        if self.successes.len() != expected || self.results.len() != expected {
            return Err(LedgerError::MalformedOutcome {
                expected,
                successes: self.successes.len(),
                results: self.results.len(),
            });
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (bool, &Bytes)> {
        self.successes.iter().copied().zip(self.results.iter())
    }
}
