//! Object storage client
//!
//! The facade ties the pieces together: every operation builds a request
//! descriptor, signs it, executes it over the shared transport, and
//! normalizes the outcome into an [`Envelope`]. The bucket is plain data on
//! the handle; changing it needs `&mut`, so it cannot shift under an
//! operation that is already borrowing the client.

use hyper::{Method, StatusCode};
use std::path::Path;
use tokio::fs::File;
use tracing::debug;

use crate::config::Config;
use crate::s3::response::normalize;
use crate::s3::signer::{encode_resource, S3SignerV2};
use crate::s3::transport::Transport;
use crate::s3::types::{Envelope, RequestBody, RequestDescriptor, Result, Value};

/// Status code expected by most operations
const CODE_SUCCESS: StatusCode = StatusCode::OK;

/// Status code expected by delete operations
const CODE_DELETE_SUCCESS: StatusCode = StatusCode::NO_CONTENT;

/// Client for one S3-compatible endpoint
///
/// Clone is cheap - the underlying HTTP client uses Arc internally.
#[derive(Clone)]
pub struct S3Client {
    /// Shared HTTP transport with stall detection
    transport: Transport,
    /// Request signer holding the credential pair
    signer: S3SignerV2,
    /// Bucket targeted by object operations
    bucket: String,
    /// Base URL for public object links, no trailing slash
    domain: String,
}

impl S3Client {
    /// Create a client from a validated configuration.
    ///
    /// Validation runs first; the transport (and its connection pool) is
    /// only acquired once the configuration is known to be complete, so a
    /// rejected configuration leaves nothing behind.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let transport = Transport::new(&config.endpoint)?;
        let signer = S3SignerV2::new(config.access_key, config.secret_key);
        Ok(Self {
            transport,
            signer,
            bucket: config.bucket.trim_matches('/').to_string(),
            domain: config.domain.trim_end_matches('/').to_string(),
        })
    }

    /// Bucket currently targeted by object operations
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Retarget object operations at another bucket.
    ///
    /// Takes `&mut self` and returns it for chaining; the bucket cannot
    /// change while any operation still borrows the client.
    pub fn set_bucket(&mut self, bucket: impl Into<String>) -> &mut Self {
        self.bucket = bucket.into().trim_matches('/').to_string();
        self
    }

    /// List all buckets owned by the credential pair.
    ///
    /// On success the envelope data is the flat list of bucket names; a
    /// service that returns a single bucket yields a one-element list.
    /// `with_headers` asks for the response headers in the envelope.
    pub async fn list_buckets(&self, with_headers: bool) -> Result<Envelope> {
        let request = RequestDescriptor::new(Method::GET, "");
        let mut envelope = self
            .send(request, CODE_SUCCESS, "Bucket list retrieved", with_headers)
            .await?;
        if envelope.is_success() {
            envelope.data = Value::List(bucket_names(&envelope.data));
        }
        Ok(envelope)
    }

    /// List the contents of a bucket.
    ///
    /// The `Contents` entry always comes back as a list, even when the
    /// service collapses a single object into a bare map.
    pub async fn get_bucket(&self, bucket: &str, with_headers: bool) -> Result<Envelope> {
        let request = RequestDescriptor::new(Method::GET, bucket_resource(bucket));
        let mut envelope = self
            .send(request, CODE_SUCCESS, "Bucket contents retrieved", with_headers)
            .await?;
        if envelope.is_success() {
            wrap_single_contents(&mut envelope.data);
        }
        Ok(envelope)
    }

    /// Create a bucket
    pub async fn create_bucket(&self, bucket: &str) -> Result<Envelope> {
        let request = RequestDescriptor::new(Method::PUT, bucket_resource(bucket));
        self.send(request, CODE_SUCCESS, "Bucket created", false)
            .await
    }

    /// Delete a bucket (must be empty)
    pub async fn delete_bucket(&self, bucket: &str) -> Result<Envelope> {
        let request = RequestDescriptor::new(Method::DELETE, bucket_resource(bucket));
        self.send(request, CODE_DELETE_SUCCESS, "Bucket deleted", false)
            .await
    }

    /// Upload a local file as an object in the current bucket.
    ///
    /// Ensures the bucket exists first: lists the buckets, creating the
    /// target if it is absent. Each step is checked; the first error
    /// envelope is returned unchanged and nothing further runs. The file
    /// streams from disk, it is never buffered whole.
    pub async fn put_object(
        &self,
        path: &Path,
        object: &str,
        with_headers: bool,
    ) -> Result<Envelope> {
        let listing = self.list_buckets(false).await?;
        if !listing.is_success() {
            return Ok(listing);
        }
        if !bucket_listed(&listing.data, &self.bucket) {
            debug!(bucket = %self.bucket, "bucket absent, creating");
            let created = self.create_bucket(&self.bucket).await?;
            if !created.is_success() {
                return Ok(created);
            }
        }
        self.upload(path, object, with_headers).await
    }

    /// Download an object; the envelope data carries the raw bytes
    pub async fn get_object(&self, object: &str, with_headers: bool) -> Result<Envelope> {
        let request = self.object_request(Method::GET, object);
        self.send(request, CODE_SUCCESS, "Object retrieved", with_headers)
            .await
    }

    /// Fetch object metadata without the body (HEAD).
    ///
    /// Size, content type, ETag and the rest are the payload here, so on
    /// success the response headers become the envelope data.
    pub async fn get_object_info(&self, object: &str) -> Result<Envelope> {
        let request = self.object_request(Method::HEAD, object);
        let mut envelope = self
            .send(request, CODE_SUCCESS, "Object info retrieved", true)
            .await?;
        // The headers slot is internal to this call; drain it on both paths.
        let headers = envelope.headers.take().unwrap_or_default();
        if envelope.is_success() {
            envelope.data = Value::Map(
                headers
                    .into_iter()
                    .map(|(name, value)| (name, Value::Scalar(value)))
                    .collect(),
            );
        }
        Ok(envelope)
    }

    /// Delete an object from the current bucket
    pub async fn delete_object(&self, object: &str) -> Result<Envelope> {
        let request = self.object_request(Method::DELETE, object);
        self.send(request, CODE_DELETE_SUCCESS, "Object deleted", false)
            .await
    }

    /// Server-side copy within the current bucket.
    ///
    /// The source travels in the `x-amz-copy-source` header and therefore
    /// participates in the signature.
    pub async fn copy_object(&self, from: &str, to: &str) -> Result<Envelope> {
        let request = self
            .object_request(Method::PUT, to)
            .with_header("x-amz-copy-source", self.object_uri(from));
        self.send(request, CODE_SUCCESS, "Object copied", false)
            .await
    }

    /// Move an object: copy, then delete the source.
    ///
    /// A failed copy short-circuits and the source is left untouched; a
    /// failed delete surfaces as the result, so the caller learns the
    /// object now exists under both names.
    pub async fn move_object(&self, from: &str, to: &str) -> Result<Envelope> {
        let copied = self.copy_object(from, to).await?;
        if !copied.is_success() {
            return Ok(copied);
        }
        let deleted = self.delete_object(from).await?;
        if !deleted.is_success() {
            return Ok(deleted);
        }
        Ok(Envelope::success(deleted.code, "Object moved", Value::default()))
    }

    /// Bucket-relative URI for an object: `{bucket}/{key}`, both trimmed of
    /// surrounding slashes
    pub fn object_uri(&self, object: &str) -> String {
        format!("{}/{}", self.bucket, object.trim_matches('/'))
    }

    /// Public URL for an object under the configured domain
    pub fn object_url(&self, object: &str) -> String {
        format!("{}/{}", self.domain, self.object_uri(object))
    }

    /// Build a descriptor for an object in the current bucket.
    ///
    /// The resource is percent-encoded exactly once here; the same encoded
    /// form is both signed and sent.
    fn object_request(&self, method: Method, object: &str) -> RequestDescriptor {
        RequestDescriptor::new(method, encode_resource(&self.object_uri(object)))
    }

    /// Sign, execute, normalize
    async fn send(
        &self,
        mut request: RequestDescriptor,
        expected: StatusCode,
        ok_message: &str,
        with_headers: bool,
    ) -> Result<Envelope> {
        self.signer.sign(&mut request);
        let raw = self.transport.execute(request).await?;
        Ok(normalize(raw, expected, ok_message, with_headers))
    }

    /// PUT a file body to the current bucket
    async fn upload(&self, path: &Path, object: &str, with_headers: bool) -> Result<Envelope> {
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        let request = self
            .object_request(Method::PUT, object)
            .with_body(RequestBody::File(file, size));
        self.send(request, CODE_SUCCESS, "Object uploaded", with_headers)
            .await
    }
}

/// Resource path for a bucket-level operation
fn bucket_resource(bucket: &str) -> String {
    encode_resource(bucket.trim_matches('/'))
}

/// Pull the flat name list out of a parsed bucket listing.
///
/// A single `Bucket` element parses as a map, several parse as a list;
/// both shapes normalize to the same thing.
fn bucket_names(data: &Value) -> Vec<Value> {
    let mut names = Vec::new();
    let mut push_name = |entry: &Value| {
        if let Some(name) = entry.get("Name").and_then(Value::as_str) {
            names.push(Value::Scalar(name.to_string()));
        }
    };
    match data.get("Buckets").and_then(|b| b.get("Bucket")) {
        Some(Value::List(entries)) => entries.iter().for_each(&mut push_name),
        Some(entry @ Value::Map(_)) => push_name(entry),
        _ => {}
    }
    names
}

/// True when `bucket` appears in a normalized bucket name list
fn bucket_listed(data: &Value, bucket: &str) -> bool {
    data.as_list()
        .map(|names| names.iter().any(|name| name.as_str() == Some(bucket)))
        .unwrap_or(false)
}

/// Promote a lone `Contents` map to a one-element list
fn wrap_single_contents(data: &mut Value) {
    if let Value::Map(map) = data {
        if let Some(entry) = map.get_mut("Contents") {
            if matches!(entry, Value::Map(_)) {
                let single = std::mem::take(entry);
                *entry = Value::List(vec![single]);
            }
        }
    }
}
