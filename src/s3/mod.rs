//! S3-compatible client with AWS `<accessKey>:<signature>` signing
//!
//! This module provides:
//! - HMAC-SHA1 request signing over the canonical request form
//! - Async bucket and object operations returning uniform envelopes
//! - A pooled HTTP transport with connect and stall timeouts

pub mod client;
pub mod response;
pub mod signer;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::S3Client;
pub use signer::S3SignerV2;
pub use types::{Envelope, RequestBody, RequestDescriptor, Result, S3Error, Status, Value};
