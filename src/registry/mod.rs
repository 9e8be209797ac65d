//! Batch Registry Module
//!
//! This module provides a database registry for executed batches and dropped
//! requests. Allows querying outcomes after the fact without keeping them in memory.

mod database;
pub use database::{BatchRecord, BatchRegistry, DeadLetterRecord, RequestRecord};
