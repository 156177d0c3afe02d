//! Process-wide client registry
//!
//! An explicit alternative to a lazily constructed global. Applications
//! that want one shared handle call [`init`] once at startup and
//! [`shutdown`] at teardown; call sites reach the handle through [`get`].
//! Prefer passing an [`S3Client`] directly where practical, the registry
//! exists for binaries where threading a handle through every call site is
//! not worth it.

use std::sync::RwLock;

use tracing::{info, warn};

use crate::s3::client::S3Client;

static REGISTRY: RwLock<Option<S3Client>> = RwLock::new(None);

/// Install the shared client, replacing any previous one.
pub fn init(client: S3Client) {
    let mut slot = REGISTRY.write().unwrap();
    if slot.is_some() {
        warn!("replacing an already installed shared client");
    }
    info!(bucket = %client.bucket(), "shared client installed");
    *slot = Some(client);
}

/// Clone the shared client, if one is installed.
///
/// Clones share the underlying connection pool, so handing one out per
/// call site is cheap.
pub fn get() -> Option<S3Client> {
    REGISTRY.read().unwrap().clone()
}

/// Remove the shared client.
///
/// Pooled connections close once the last outstanding clone is dropped.
/// Calling this with nothing installed is a no-op.
pub fn shutdown() {
    let mut slot = REGISTRY.write().unwrap();
    if slot.take().is_some() {
        info!("shared client shut down");
    }
}
