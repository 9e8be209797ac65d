//! API Module
//!
//! This module handles the HTTP API clients use to submit signed forward
//! requests and to look up nonces and batch outcomes.

mod server;
pub use server::{create_router, AppState, Server};
