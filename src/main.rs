use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use relayer::{
    api::{AppState, Server},
    batch::BatchDispatcher,
    config::{Config, LedgerMode},
    ledger::{ExecutionLedger, MemoryLedger, RpcLedger},
    pool::PendingQueue,
    registry::BatchRegistry,
    report::{LogReporter, ResultReporter},
    validation::SignatureVerifier,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// The main entry point for the relayer.
///
/// Initializes logging, loads the configuration, connects to the relay hub,
/// starts the batch dispatcher in the background and serves the API until
/// Ctrl-C. On shutdown the dispatcher finishes its current batch and flushes
/// the queue once more before the process exits.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let path = std::env::var("RELAYER_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    let config = Config::load(&path)?;
    info!("Relayer starting with config: {:?}", config);

    let domain = config.ledger.domain();
    let verifier = SignatureVerifier::new(domain.clone())?;

    let ledger: Arc<dyn ExecutionLedger> = match config.ledger.mode {
        LedgerMode::Rpc => Arc::new(RpcLedger::connect(&config.ledger)?),
        LedgerMode::Memory => {
            warn!("Using the in-memory relay hub, nothing will be submitted on chain");
            let operator = memory_operator(&config.ledger.relayer_private_key);
            Arc::new(MemoryLedger::new(domain, operator)?)
        }
    };

    let queue = Arc::new(PendingQueue::new());
    let mut reporters: Vec<Arc<dyn ResultReporter>> = vec![Arc::new(LogReporter)];
    let mut state = AppState::new(verifier, queue.clone(), ledger.clone(), config.api.admission);
    let mut last_batch_id = 0;

    if let Some(database) = &config.database {
        let registry = BatchRegistry::connect(&database.url).await?;
        last_batch_id = registry.last_batch_id().await?;
        info!("Batch registry opened at {} (last batch #{})", database.url, last_batch_id);
        reporters.push(Arc::new(registry.clone()));
        state = state.with_registry(registry);
    }

    let dispatcher = BatchDispatcher::new(queue, ledger, reporters, config.batch.clone()).resume_after(last_batch_id);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = tokio::spawn(Arc::new(dispatcher).run(shutdown_rx));
    info!("Batch dispatcher started");

    let server = Server::new(config.api.clone(), state);
    server.start(shutdown_signal()).await?;

    // the dispatcher only exits early if it panicked
    let _ = shutdown_tx.send(true);
    dispatcher.await?;

    info!("Relayer stopped");
    Ok(())
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Operator identity of the in-memory hub; the zero address when no key is configured
fn memory_operator(key: &str) -> Address {
    key.parse::<LocalWallet>().map(|wallet| wallet.address()).unwrap_or_default()
}
