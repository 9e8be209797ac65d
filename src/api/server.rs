//! API Server Module
//!
//! This module implements the HTTP server that accepts signed forward requests.
//! A submission is decoded, its signature is checked, and it is appended to the
//! pending queue. The client is answered at that point: execution happens
//! later, in a batch, and its outcome goes to the result reporters.
//!
//! # Endpoints
//! - `POST /submit`: admit a signed forward request
//! - `GET /nonce/:address`: current sequence counter of a signer on the hub
//! - `GET /batches/:id`: recorded outcome of an executed batch
//! - `GET /health`: liveness and queue depth

use crate::{
    codec::{decode_address, decode_submission},
    config::{AdmissionMode, ApiConfig},
    error::SubmitError,
    ledger::ExecutionLedger,
    pool::PendingQueue,
    registry::{BatchRecord, BatchRegistry, RequestRecord},
    validation::SignatureVerifier,
    SignedRequest,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ethers::utils::to_checksum;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared application state that is accessible across all request handlers
///
/// - `verifier`: Local EIP-712 check against the configured hub domain
/// - `queue`: Stores admitted requests until the next batch
/// - `ledger`: Relay hub, for remote admission checks and nonce lookups
/// - `admission`: Which of the two signature checks `/submit` applies
/// - `registry`: Executed batch outcomes, when persistence is enabled
#[derive(Clone)]
pub struct AppState {
    verifier: Arc<SignatureVerifier>,
    queue: Arc<PendingQueue>,
    ledger: Arc<dyn ExecutionLedger>,
    admission: AdmissionMode,
    registry: Option<BatchRegistry>,
}

impl AppState {
    pub fn new(
        verifier: SignatureVerifier,
        queue: Arc<PendingQueue>,
        ledger: Arc<dyn ExecutionLedger>,
        admission: AdmissionMode,
    ) -> Self {
        Self {
            verifier: Arc::new(verifier),
            queue,
            ledger,
            admission,
            registry: None,
        }
    }

    pub fn with_registry(mut self, registry: BatchRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Run the configured signature checks on a decoded submission
    async fn admit(&self, signed: &SignedRequest) -> Result<(), SubmitError> {
        let local = matches!(self.admission, AdmissionMode::Local | AdmissionMode::Both);
        let remote = matches!(self.admission, AdmissionMode::Ledger | AdmissionMode::Both);

        if local && !self.verifier.verify(&signed.request, &signed.signature) {
            return Err(SubmitError::InvalidSignature);
        }
        if remote && !self.ledger.verify(&signed.request, &signed.signature).await? {
            return Err(SubmitError::InvalidSignature);
        }
        Ok(())
    }
}

/// The main API server struct
pub struct Server {
    config: ApiConfig,
    state: AppState,
}

impl Server {
    /// Creates a new API server instance
    ///
    /// # Arguments
    /// * `config` - Bind address and admission settings
    /// * `state` - Shared components the handlers work with
    pub fn new(config: ApiConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Starts the API server and serves until `shutdown` resolves
    ///
    /// In-flight requests are allowed to finish once `shutdown` fires.
    ///
    /// # Returns
    /// `Ok(())` after a graceful shutdown, or an error if binding fails
    pub async fn start<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = create_router(self.state);

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("API server listening on {} (admission: {:?})", addr, self.config.admission);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

        info!("API server stopped");
        Ok(())
    }
}

/// Build the router with every endpoint bound to `state`
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/submit", post(submit))
        .route("/nonce/:address", get(nonce))
        .route("/batches/:id", get(batch))
        .route("/health", get(health))
        .with_state(state)
}

/// Error body shared by every endpoint
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = ErrorResponse {
        success: false,
        message: message.to_string(),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        match self {
            SubmitError::Decode(_) => error_response(StatusCode::BAD_REQUEST, "Invalid Request"),
            SubmitError::InvalidSignature => error_response(StatusCode::BAD_REQUEST, "Invalid Signature"),
            SubmitError::Ledger(_) => error_response(StatusCode::BAD_GATEWAY, "Ledger Unavailable"),
        }
    }
}

/// Handles `POST /submit`
///
/// The body is read raw so that malformed JSON maps to the same
/// "Invalid Request" answer as a missing or malformed field.
///
/// # Returns
/// `200` with an empty body once the request is queued, otherwise the
/// `SubmitError` response
async fn submit(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, SubmitError> {
    let signed = decode_submission(&body).inspect_err(|e| warn!("Rejected submission: {}", e))?;

    match state.admit(&signed).await {
        Ok(()) => {}
        Err(SubmitError::Ledger(e)) => {
            error!("Ledger verify failed for request from {:?}: {}", signed.request.from, e);
            return Err(SubmitError::Ledger(e));
        }
        Err(e) => {
            warn!(
                "Rejected request from {:?} (nonce {}): {}",
                signed.request.from, signed.request.nonce, e
            );
            return Err(e);
        }
    }

    info!(
        "Queued request from {:?} to {:?} (nonce {})",
        signed.request.from, signed.request.to, signed.request.nonce
    );
    state.queue.push(signed).await;
    Ok(StatusCode::OK)
}

#[derive(Debug, Serialize)]
struct NonceResponse {
    address: String,
    /// Decimal
    nonce: String,
}

/// Handles `GET /nonce/:address`
async fn nonce(State(state): State<AppState>, Path(address): Path<String>) -> Response {
    let Ok(address) = decode_address(&address) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid Address");
    };

    match state.ledger.get_nonce(address).await {
        Ok(nonce) => Json(NonceResponse {
            address: to_checksum(&address, None),
            nonce: nonce.to_string(),
        })
        .into_response(),
        Err(e) => {
            error!("Nonce lookup for {:?} failed: {}", address, e);
            error_response(StatusCode::BAD_GATEWAY, "Ledger Unavailable")
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    #[serde(flatten)]
    batch: BatchRecord,
    results: Vec<RequestRecord>,
}

/// Handles `GET /batches/:id`
async fn batch(State(state): State<AppState>, Path(batch_id): Path<String>) -> Response {
    let Ok(batch_id) = batch_id.parse::<u64>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid Batch Id");
    };
    let Some(registry) = state.registry else {
        return error_response(StatusCode::NOT_FOUND, "Registry Disabled");
    };

    let lookup = async {
        let Some(batch) = registry.batch(batch_id).await? else {
            return Ok(None);
        };
        let results = registry.results(batch_id).await?;
        Ok::<_, sqlx::Error>(Some(BatchResponse { batch, results }))
    };

    match lookup.await {
        Ok(Some(response)) => Json(response).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Batch Not Found"),
        Err(e) => {
            error!("Registry lookup of batch #{} failed: {}", batch_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Registry Unavailable")
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    pending: usize,
}

/// Handles `GET /health`
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let pending = state.queue.len().await;
    debug!("Health check: {} pending", pending);
    Json(HealthResponse { status: "ok", pending })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::MemoryLedger,
        test_utils::{alice, bob, hub_domain, hub_verifier, operator, sample_request, sign_request},
        validation::Domain,
        Batch, ExecutionOutcome, PendingEntry,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Utc;
    use ethers::signers::Signer;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn ledger() -> MemoryLedger {
        MemoryLedger::new(hub_domain(), operator().address()).unwrap()
    }

    fn app(admission: AdmissionMode, ledger: MemoryLedger) -> (Router, Arc<PendingQueue>) {
        let queue = Arc::new(PendingQueue::new());
        let state = AppState::new(hub_verifier(), queue.clone(), Arc::new(ledger), admission);
        (create_router(state), queue)
    }

    fn submission(signed: &SignedRequest) -> Value {
        json!({ "tx": signed.request, "signature": signed.signature })
    }

    async fn post_submit(app: Router, body: impl Into<Body>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("POST")
            .uri("/submit")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    fn message(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_valid_submission_is_queued() {
        let (app, queue) = app(AdmissionMode::Local, ledger());
        let signed = sign_request(&alice(), sample_request(alice().address(), 0));

        let (status, body) = post_submit(app, submission(&signed).to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        let entries = queue.drain_all().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].signed, signed);
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_request() {
        for body in [
            "not json".to_string(),
            json!({ "signature": "0x00" }).to_string(),
            json!({ "tx": { "from": "0x1234" }, "signature": "0x00" }).to_string(),
        ] {
            let (app, queue) = app(AdmissionMode::Local, ledger());
            let (status, body) = post_submit(app, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(message(&body), json!({ "success": false, "message": "Invalid Request" }));
            assert!(queue.is_empty().await);
        }
    }

    #[tokio::test]
    async fn test_short_signature_is_invalid_request() {
        let (app, queue) = app(AdmissionMode::Local, ledger());
        let signed = sign_request(&alice(), sample_request(alice().address(), 0));
        let mut body = submission(&signed);
        body["signature"] = json!("0x0000");

        let (status, body) = post_submit(app, body.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message(&body)["message"], "Invalid Request");
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_wrong_signer_is_invalid_signature() {
        let (app, queue) = app(AdmissionMode::Local, ledger());
        // signed by bob on behalf of alice
        let signed = sign_request(&bob(), sample_request(alice().address(), 0));

        let (status, body) = post_submit(app, submission(&signed).to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message(&body), json!({ "success": false, "message": "Invalid Signature" }));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_admission_does_not_check_nonce() {
        let (app, queue) = app(AdmissionMode::Both, ledger());
        let signed = sign_request(&alice(), sample_request(alice().address(), 7));

        let (status, _) = post_submit(app, submission(&signed).to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_ledger_admission_uses_hub_domain() {
        // local verifier and hub disagree on the chain id
        let other_hub = MemoryLedger::new(
            Domain::new("RelayHub", 1u64, hub_domain().verifying_contract),
            operator().address(),
        )
        .unwrap();
        let signed = sign_request(&alice(), sample_request(alice().address(), 0));

        let (local, _) = app(AdmissionMode::Local, other_hub.clone());
        assert_eq!(post_submit(local, submission(&signed).to_string()).await.0, StatusCode::OK);

        let (remote, queue) = app(AdmissionMode::Ledger, other_hub);
        let (status, body) = post_submit(remote, submission(&signed).to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message(&body)["message"], "Invalid Signature");
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_nonce_endpoint() {
        let hub = ledger();
        let signed = sign_request(&alice(), sample_request(alice().address(), 0));
        hub.execute(&[signed.request], &[signed.signature]).await.unwrap();
        let (app, _) = app(AdmissionMode::Local, hub);

        let uri = format!("/nonce/{:?}", alice().address());
        let (status, body) = get(app.clone(), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nonce"], "1");
        assert_eq!(body["address"], to_checksum(&alice().address(), None));

        let (status, body) = get(app, "/nonce/0xnotanaddress").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid Address");
    }

    #[tokio::test]
    async fn test_nonce_endpoint_rejects_malformed_addresses() {
        let (app, _) = app(AdmissionMode::Local, ledger());
        let checksummed = to_checksum(&alice().address(), None);
        let flip = checksummed[2..].find(|c: char| c.is_ascii_alphabetic()).unwrap() + 2;
        let mut bad_checksum = checksummed.clone();
        let letter = &checksummed[flip..=flip];
        let flipped = if letter == letter.to_uppercase() { letter.to_lowercase() } else { letter.to_uppercase() };
        bad_checksum.replace_range(flip..=flip, &flipped);

        for address in [checksummed[2..].to_string(), bad_checksum] {
            let (status, body) = get(app.clone(), &format!("/nonce/{address}")).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{address}");
            assert_eq!(body["message"], "Invalid Address");
        }

        let (status, _) = get(app, &format!("/nonce/{}", checksummed.to_lowercase())).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_batches_endpoint_rejects_non_numeric_id() {
        let (app, _) = app(AdmissionMode::Local, ledger());
        for uri in ["/batches/abc", "/batches/-1"] {
            let (status, body) = get(app.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["message"], "Invalid Batch Id");
        }
    }

    #[tokio::test]
    async fn test_batches_endpoint() {
        let registry = BatchRegistry::connect("sqlite::memory:").await.unwrap();
        let batch = Batch {
            batch_id: 4,
            entries: vec![PendingEntry::new(sign_request(&alice(), sample_request(alice().address(), 0)))],
            created_at: Utc::now(),
        };
        let mut outcome = ExecutionOutcome::default();
        outcome.push(true, vec![0x2a].into());
        registry.store(&batch, &outcome).await.unwrap();

        let queue = Arc::new(PendingQueue::new());
        let state = AppState::new(hub_verifier(), queue, Arc::new(ledger()), AdmissionMode::Local)
            .with_registry(registry);
        let app = create_router(state);

        let (status, body) = get(app.clone(), "/batches/4").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["batch_id"], 4);
        assert_eq!(body["success_count"], 1);
        assert_eq!(body["results"][0]["result"], "0x2a");
        assert_eq!(body["results"][0]["success"], true);

        let (status, body) = get(app, "/batches/5").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Batch Not Found");
    }

    #[tokio::test]
    async fn test_batches_endpoint_without_registry() {
        let (app, _) = app(AdmissionMode::Local, ledger());
        let (status, body) = get(app, "/batches/1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Registry Disabled");
    }

    #[tokio::test]
    async fn test_health_reports_queue_depth() {
        let (app, queue) = app(AdmissionMode::Local, ledger());
        queue.push(sign_request(&alice(), sample_request(alice().address(), 0))).await;

        let (status, body) = get(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok", "pending": 1 }));
    }
}
