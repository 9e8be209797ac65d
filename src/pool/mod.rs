//! Request Pool Module
//!
//! This module holds verified signed requests between admission and batch
//! dispatch. The queue lives in memory only.

mod pending_queue;

pub use pending_queue::PendingQueue;
