//! s3kit - lightweight client for S3-compatible object storage
//!
//! Signs each request with the AWS `<accessKey>:<signature>` scheme
//! (HMAC-SHA1 over the canonical request form), streams uploads from disk,
//! and folds every outcome into a uniform success/error envelope.

pub mod config;
pub mod registry;
pub mod s3;

pub use config::Config;
pub use s3::client::S3Client;
pub use s3::types::{Envelope, Result, S3Error, Status, Value};
