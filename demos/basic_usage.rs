//! Basic usage example
//!
//! Points the client at an endpoint taken from the environment and walks
//! through the bucket and object operations.
//!
//! Run with:
//! ```
//! S3KIT_ACCESS_KEY=... S3KIT_SECRET_KEY=... \
//! S3KIT_ENDPOINT=https://s3.example.com \
//! S3KIT_BUCKET=media \
//! S3KIT_DOMAIN=https://cdn.example.com \
//! cargo run --example basic_usage
//! ```

use std::path::Path;

use s3kit::{Config, S3Client, Value};

#[tokio::main]
async fn main() -> s3kit::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let client = S3Client::new(Config::from_env()?)?;

    println!("s3kit - Basic Usage Example");
    println!("===========================\n");

    // Example 1: List buckets
    println!("1. Listing buckets...");
    let buckets = client.list_buckets(false).await?;
    println!("   [{}] {}: {:?}\n", buckets.code, buckets.message, buckets.data);

    // Example 2: Upload a file (bucket is created if absent)
    println!("2. Uploading Cargo.toml as demo/manifest.toml...");
    let uploaded = client
        .put_object(Path::new("Cargo.toml"), "demo/manifest.toml", false)
        .await?;
    println!("   [{}] {}\n", uploaded.code, uploaded.message);

    // Example 3: Object metadata and public URL
    println!("3. Fetching object info...");
    let info = client.get_object_info("demo/manifest.toml").await?;
    println!("   [{}] {}", info.code, info.message);
    for name in ["content-length", "content-type", "etag"] {
        if let Some(value) = info.data.get(name).and_then(Value::as_str) {
            println!("   {}: {}", name, value);
        }
    }
    println!("   public URL: {}\n", client.object_url("demo/manifest.toml"));

    // Example 4: Download it back
    println!("4. Downloading object...");
    let downloaded = client.get_object("demo/manifest.toml", false).await?;
    let size = downloaded.data.as_bytes().map(<[u8]>::len).unwrap_or(0);
    println!("   [{}] {} ({} bytes)\n", downloaded.code, downloaded.message, size);

    // Example 5: Copy, move, clean up
    println!("5. Copying and moving...");
    let copied = client
        .copy_object("demo/manifest.toml", "demo/copy.toml")
        .await?;
    println!("   copy: [{}] {}", copied.code, copied.message);
    let moved = client
        .move_object("demo/copy.toml", "demo/final.toml")
        .await?;
    println!("   move: [{}] {}\n", moved.code, moved.message);

    println!("6. Cleaning up...");
    client.delete_object("demo/manifest.toml").await?;
    client.delete_object("demo/final.toml").await?;
    println!("   done");

    Ok(())
}
