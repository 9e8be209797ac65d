//! Configuration Module
//!
//! This module defines all configuration structures for the relayer.
//! Configuration is loaded from a TOML file and parsed using serde, then
//! overridden by the environment variables the relayer has always honoured
//! (`RPC_URL`, `CHAIN_ID`, `RELAY_HUB_ADDRESS`, `RELAYER_PRIV_KEY`, `PORT`, `TIMEOUT`).

use crate::{batch::FailurePolicy, validation::Domain};
use anyhow::{bail, Context};
use ethers::types::Address;
use serde::Deserialize;
use std::{fmt, fs, io};
use tracing::warn;

/// Main configuration structure
///
/// Every section has defaults, so a partial (or missing) file is valid.
///
/// # Example TOML
/// ```toml
/// [api]
/// host = "0.0.0.0"
/// port = 8000
/// admission = "local"
///
/// [ledger]
/// mode = "rpc"
/// rpc_url = "http://127.0.0.1:8545/"
/// chain_id = 31337
/// relay_hub_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
///
/// [batch]
/// timeout_interval_ms = 60000
/// on_failure = "retry"
/// max_attempts = 3
///
/// [database]
/// url = "sqlite://relayer.db?mode=rwc"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub ledger: LedgerConfig,
    pub batch: BatchConfig,
    /// Batch registry; outcomes are only logged when absent
    pub database: Option<DatabaseConfig>,
}

/// Which check a submission must pass before it is queued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionMode {
    /// Local signature verification against the configured domain
    #[default]
    Local,
    /// Ask the relay hub's `verify`
    Ledger,
    Both,
}

/// API server configuration
///
/// # Fields
/// - `host`: IP address to bind to (e.g., "127.0.0.1" or "0.0.0.0")
/// - `port`: TCP port to listen on
/// - `admission`: signature check applied to `/submit`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub admission: AdmissionMode,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            admission: AdmissionMode::Local,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// Deployed relay hub reached over JSON-RPC
    #[default]
    Rpc,
    /// In-process hub, for local development
    Memory,
}

/// Relay hub connection configuration
///
/// # Fields
/// - `rpc_url`: JSON-RPC endpoint of the chain the hub lives on
/// - `chain_id`: chain id used both for signing transactions and in the EIP-712 domain
/// - `relay_hub_address`: hub contract, also the domain's `verifyingContract`
/// - `relayer_private_key`: operator key paying for the batches
/// - `domain_name`: EIP-712 domain name the hub was deployed with
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub mode: LedgerMode,
    pub rpc_url: String,
    pub chain_id: u64,
    pub relay_hub_address: Address,
    pub relayer_private_key: String,
    pub domain_name: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mode: LedgerMode::Rpc,
            rpc_url: "http://127.0.0.1:8545/".to_string(),
            chain_id: 1,
            relay_hub_address: Address::zero(),
            relayer_private_key: String::new(),
            domain_name: "RelayHub".to_string(),
        }
    }
}

impl fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.relayer_private_key.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("LedgerConfig")
            .field("mode", &self.mode)
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("relay_hub_address", &self.relay_hub_address)
            .field("relayer_private_key", &key)
            .field("domain_name", &self.domain_name)
            .finish()
    }
}

impl LedgerConfig {
    /// EIP-712 domain requests must be signed under
    pub fn domain(&self) -> Domain {
        Domain::new(self.domain_name.clone(), self.chain_id, self.relay_hub_address)
    }
}

/// Batch dispatch configuration
///
/// # Fields
/// - `timeout_interval_ms`: interval between dispatch ticks
/// - `on_failure`: what happens to a batch whose submission failed
/// - `max_attempts`: dispatches an entry may fail before it is dead-lettered (retry only)
/// - `backoff_base_ms` / `backoff_max_ms`: pause after consecutive failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub timeout_interval_ms: u64,
    pub on_failure: FailurePolicy,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            timeout_interval_ms: 60_000,
            on_failure: FailurePolicy::Retry,
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
        }
    }
}

/// Database configuration
///
/// # Fields
/// - `url`: Database connection URL (e.g., "sqlite://relayer.db?mode=rwc")
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file; defaults are used if it does not exist
    ///
    /// # Returns
    /// * `Ok(Config)` if the resulting configuration is usable
    /// * `Err` if the file is unreadable, the TOML or an override is invalid,
    ///   or validation fails
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).with_context(|| format!("invalid config file {}", path))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path);
                Self::default()
            }
            Err(e) => return Err(e).with_context(|| format!("failed to read config file {}", path)),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override file values with environment variables
    ///
    /// # Arguments
    /// * `lookup` - Source of variables, `std::env::var` in production
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RPC_URL") {
            self.ledger.rpc_url = url;
        }
        if let Some(chain_id) = lookup("CHAIN_ID") {
            self.ledger.chain_id = chain_id.trim().parse().context("CHAIN_ID must be an integer")?;
        }
        if let Some(address) = lookup("RELAY_HUB_ADDRESS") {
            self.ledger.relay_hub_address = address
                .trim()
                .parse()
                .context("RELAY_HUB_ADDRESS must be a 20-byte hex address")?;
        }
        if let Some(key) = lookup("RELAYER_PRIV_KEY") {
            self.ledger.relayer_private_key = key;
        }
        if let Some(port) = lookup("PORT") {
            self.api.port = port.trim().parse().context("PORT must be a valid port number")?;
        }
        if let Some(timeout) = lookup("TIMEOUT") {
            self.batch.timeout_interval_ms = timeout.trim().parse().context("TIMEOUT must be milliseconds")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch.timeout_interval_ms == 0 {
            bail!("batch.timeout_interval_ms must be positive");
        }
        if self.batch.max_attempts == 0 {
            bail!("batch.max_attempts must be at least 1");
        }
        if self.batch.backoff_base_ms > self.batch.backoff_max_ms {
            bail!("batch.backoff_base_ms must not exceed batch.backoff_max_ms");
        }
        if self.ledger.mode == LedgerMode::Rpc {
            if self.ledger.relay_hub_address.is_zero() {
                bail!("ledger.relay_hub_address (RELAY_HUB_ADDRESS) is required in rpc mode");
            }
            if self.ledger.relayer_private_key.is_empty() {
                bail!("ledger.relayer_private_key (RELAYER_PRIV_KEY) is required in rpc mode");
            }
        }
        Ok(())
    }
}
