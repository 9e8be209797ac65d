//! Request Codec Module
//!
//! Turns the JSON body of a submission into a typed `SignedRequest`, rejecting
//! anything that is not well-formed before it can reach signature checks.

mod decoder;
pub use decoder::{decode, decode_address, decode_submission};
