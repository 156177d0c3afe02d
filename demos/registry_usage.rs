//! Shared-handle example
//!
//! Installs one client in the process-wide registry at startup; call sites
//! clone the handle out instead of threading it through every signature.
//!
//! Run with the same S3KIT_* environment as `basic_usage`:
//! ```
//! cargo run --example registry_usage
//! ```

use s3kit::{registry, Config, S3Client, Value};

#[tokio::main]
async fn main() -> s3kit::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    registry::init(S3Client::new(Config::from_env()?)?);

    print_bucket_listing().await?;

    registry::shutdown();
    Ok(())
}

/// A call site with no client parameter: it reaches the registry instead.
async fn print_bucket_listing() -> s3kit::Result<()> {
    let client = registry::get().expect("registry initialized in main");

    let listing = client.get_bucket(client.bucket(), false).await?;
    println!("[{}] {}", listing.code, listing.message);

    if let Some(contents) = listing.data.get("Contents").and_then(Value::as_list) {
        for entry in contents {
            let key = entry.get("Key").and_then(Value::as_str).unwrap_or("?");
            let size = entry.get("Size").and_then(Value::as_str).unwrap_or("0");
            println!("  {:>12}  {}", size, key);
        }
    }
    Ok(())
}
