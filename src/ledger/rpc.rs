//! JSON-RPC adapter for the deployed relay hub.
//!
//! The relayer's operator key signs the `execute` transactions; the same key
//! is the only caller the hub accepts for `execute`.

use super::ExecutionLedger;
use crate::{config::LedgerConfig, error::LedgerError, ExecutionOutcome, ForwardRequest};
use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, Bytes, H256, U256, U64},
};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info};

mod bindings {
    ethers::contract::abigen!(
        RelayHub,
        r#"[
            struct ForwardRequest { address from; address to; uint256 value; uint256 gas; uint256 nonce; bytes data; }
            function verify(ForwardRequest req, bytes signature) external view returns (bool)
            function execute(ForwardRequest[] reqs, bytes[] signatures) external returns (bool[] successes, bytes[] results)
            function getNonce(address from) external view returns (uint256)
        ]"#
    );
}

use bindings::{ForwardRequest as HubRequest, RelayHub};

type HubClient = SignerMiddleware<Provider<Http>, LocalWallet>;

impl From<&ForwardRequest> for HubRequest {
    fn from(request: &ForwardRequest) -> Self {
        Self {
            from: request.from,
            to: request.to,
            value: request.value,
            gas: request.gas,
            nonce: request.nonce,
            data: request.data.clone(),
        }
    }
}

fn rpc_error(e: impl Display) -> LedgerError {
    LedgerError::Rpc(e.to_string())
}

/// Failure after `tx_hash` was broadcast
fn unconfirmed(tx_hash: H256, e: impl Display) -> LedgerError {
    LedgerError::Unconfirmed {
        tx_hash,
        reason: e.to_string(),
    }
}

/// Relay hub reached over JSON-RPC
pub struct RpcLedger {
    hub: RelayHub<HubClient>,
    operator: Address,
}

impl RpcLedger {
    /// Creates a ledger client from the `[ledger]` configuration
    ///
    /// # Arguments
    /// * `config` - RPC endpoint, chain id, hub address and operator key
    ///
    /// # Returns
    /// An error if the RPC URL or the operator key cannot be parsed
    pub fn connect(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| LedgerError::Config(format!("invalid rpc url {}: {}", config.rpc_url, e)))?;
        let wallet = config
            .relayer_private_key
            .parse::<LocalWallet>()
            .map_err(|e| LedgerError::Config(format!("invalid relayer key: {}", e)))?
            .with_chain_id(config.chain_id);
        let operator = wallet.address();

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let hub = RelayHub::new(config.relay_hub_address, client);
        info!(
            "Relay hub {:?} on chain {} via {} (operator {:?})",
            config.relay_hub_address, config.chain_id, config.rpc_url, operator
        );

        Ok(Self { hub, operator })
    }

    pub fn operator(&self) -> Address {
        self.operator
    }
}

#[async_trait]
impl ExecutionLedger for RpcLedger {
    async fn verify(&self, request: &ForwardRequest, signature: &Bytes) -> Result<bool, LedgerError> {
        self.hub
            .verify(request.into(), signature.clone())
            .call()
            .await
            .map_err(rpc_error)
    }

    /// Simulates the batch to capture per-request outcomes, then submits it.
    async fn execute(
        &self,
        requests: &[ForwardRequest],
        signatures: &[Bytes],
    ) -> Result<ExecutionOutcome, LedgerError> {
        // the hub would revert; skip the round trip
        if requests.len() != signatures.len() {
            return Err(LedgerError::LengthMismatch {
                requests: requests.len(),
                signatures: signatures.len(),
            });
        }

        let call = self
            .hub
            .execute(requests.iter().map(HubRequest::from).collect(), signatures.to_vec());

        let (successes, results) = call.call().await.map_err(rpc_error)?;
        debug!("Static call returned {} outcomes", successes.len());

        let pending = call.send().await.map_err(rpc_error)?;
        let tx_hash = pending.tx_hash();
        info!("Submitted execute transaction {:?}", tx_hash);

        // from here on the hub may already have executed the batch
        let receipt = pending
            .await
            .map_err(|e| unconfirmed(tx_hash, e))?
            .ok_or_else(|| unconfirmed(tx_hash, "no receipt, transaction dropped from the mempool"))?;
        if receipt.status == Some(U64::zero()) {
            return Err(LedgerError::Reverted(tx_hash));
        }

        Ok(ExecutionOutcome {
            successes,
            results,
            tx_hash: Some(tx_hash),
        })
    }

    async fn get_nonce(&self, address: Address) -> Result<U256, LedgerError> {
        self.hub.get_nonce(address).call().await.map_err(rpc_error)
    }
}
