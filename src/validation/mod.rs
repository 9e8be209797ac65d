//! Signature Validation Module
//!
//! This module checks that forward requests (and token permits) were signed by
//! the account they claim to come from, using EIP-712 typed structured data.

pub mod typed_data;
mod validator;

pub use typed_data::{Domain, TypedSchema, TypedStruct};
pub use validator::{recover_signer, verify, SignatureVerifier};
