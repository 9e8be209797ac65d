//! Batch Dispatch Module
//!
//! This module turns the pending queue into relay hub submissions:
//! - BatchEngine: Seals drained entries into numbered batches
//! - BatchDispatcher: Periodic single-flight submission loop
//! - FailurePolicy / Backoff: Handling of batches the hub never executed

mod dispatcher;
mod engine;
mod retry;


pub use dispatcher::{BatchDispatcher, TickOutcome};
pub use engine::BatchEngine;
pub use retry::{Backoff, FailurePolicy};
