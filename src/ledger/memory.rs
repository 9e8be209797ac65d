//! In-memory relay hub.
//!
//! Implements the same contract as the deployed hub: operator-only `execute`,
//! per-request signature and nonce checks, and failure isolation. Call targets
//! are plain Rust values registered at an address.

use super::ExecutionLedger;
use crate::{
    error::{LedgerError, TypedDataError},
    validation::{Domain, SignatureVerifier},
    ExecutionOutcome, ForwardRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, U256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Revert reason for a request whose nonce is not the signer's current counter
pub const NONCE_MISMATCH: &str = "RelayHub: nonce mismatch";

/// `Error(string)`
pub const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// ABI-encode a revert reason the way Solidity's `require(cond, reason)` does.
pub fn revert_payload(reason: &str) -> Bytes {
    let mut payload = ERROR_SELECTOR.to_vec();
    payload.extend(encode(&[Token::String(reason.to_string())]));
    payload.into()
}

/// Environment of a forwarded call as seen by its target.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Signer of the forward request, the effective caller
    pub sender: Address,
    /// Address the target is registered at
    pub this: Address,
    pub value: U256,
    pub gas: U256,
    pub chain_id: U256,
    /// Seconds since the unix epoch at execution time
    pub timestamp: U256,
}

/// Contract reachable through a forwarded call.
///
/// `Ok` carries the return data, `Err` the revert payload.
#[async_trait]
pub trait CallTarget: Send + Sync {
    async fn call(&self, ctx: &CallContext, data: &[u8]) -> Result<Bytes, Bytes>;
}

#[derive(Default)]
struct LedgerState {
    nonces: HashMap<Address, U256>,
    targets: HashMap<Address, Arc<dyn CallTarget>>,
}

/// Relay hub held entirely in memory.
///
/// Clones share state; [`MemoryLedger::connect`] returns a handle acting as a
/// different caller, so operator checks can be exercised.
#[derive(Clone)]
pub struct MemoryLedger {
    verifier: SignatureVerifier,
    operator: Address,
    caller: Address,
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedger {
    /// Creates a ledger whose handle acts as `operator`.
    pub fn new(domain: Domain, operator: Address) -> Result<Self, TypedDataError> {
        Ok(Self {
            verifier: SignatureVerifier::new(domain)?,
            operator,
            caller: operator,
            state: Arc::new(Mutex::new(LedgerState::default())),
        })
    }

    pub fn connect(&self, caller: Address) -> Self {
        Self {
            caller,
            ..self.clone()
        }
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    pub fn domain(&self) -> &Domain {
        self.verifier.domain()
    }

    /// Register `target` so forwarded calls to `address` reach it.
    pub async fn deploy(&self, address: Address, target: Arc<dyn CallTarget>) {
        self.state.lock().await.targets.insert(address, target);
    }
}

#[async_trait]
impl ExecutionLedger for MemoryLedger {
    async fn verify(&self, request: &ForwardRequest, signature: &Bytes) -> Result<bool, LedgerError> {
        Ok(self.verifier.verify(request, signature))
    }

    async fn execute(
        &self,
        requests: &[ForwardRequest],
        signatures: &[Bytes],
    ) -> Result<ExecutionOutcome, LedgerError> {
        if self.caller != self.operator {
            warn!("Rejected execute from non-operator {:?}", self.caller);
            return Err(LedgerError::Unauthorized(self.caller));
        }
        if requests.len() != signatures.len() {
            return Err(LedgerError::LengthMismatch {
                requests: requests.len(),
                signatures: signatures.len(),
            });
        }

        let mut state = self.state.lock().await;
        let timestamp = U256::from(Utc::now().timestamp().max(0) as u64);
        let mut outcome = ExecutionOutcome::default();

        for (index, (request, signature)) in requests.iter().zip(signatures).enumerate() {
            if !self.verifier.verify(request, signature) {
                debug!("Request #{} rejected: bad signature", index);
                outcome.push(false, Bytes::default());
                continue;
            }

            let current = state.nonces.get(&request.from).copied().unwrap_or_default();
            if request.nonce != current {
                debug!(
                    "Request #{} rejected: nonce {} but counter of {:?} is {}",
                    index, request.nonce, request.from, current
                );
                outcome.push(false, revert_payload(NONCE_MISMATCH));
                continue;
            }

            let result = match state.targets.get(&request.to).cloned() {
                Some(target) => {
                    let ctx = CallContext {
                        sender: request.from,
                        this: request.to,
                        value: request.value,
                        gas: request.gas,
                        chain_id: self.domain().chain_id,
                        timestamp,
                    };
                    target.call(&ctx, &request.data).await
                }
                // an account without code accepts any call
                None => Ok(Bytes::default()),
            };

            match result {
                Ok(data) => {
                    state.nonces.insert(request.from, current + 1);
                    outcome.push(true, data);
                }
                Err(payload) => {
                    debug!("Request #{} reverted", index);
                    outcome.push(false, payload);
                }
            }
        }

        Ok(outcome)
    }

    async fn get_nonce(&self, address: Address) -> Result<U256, LedgerError> {
        let state = self.state.lock().await;
        Ok(state.nonces.get(&address).copied().unwrap_or_default())
    }
}
