//! HTTP transport
//!
//! Executes one signed request at a time over a single long-lived connection
//! handle:
//! - HTTP/1.1 with TCP_NODELAY, native-tls (OpenSSL) for TLS
//! - 30s connect timeout on the connector
//! - stall detection: a transfer averaging under one byte per second across
//!   a 30s window is aborted
//! - file bodies are streamed chunk by chunk, never buffered whole
//!
//! The handle is acquired at construction and released when the transport
//! drops. 4xx/5xx statuses are valid responses here, not errors.

use bytes::Bytes;
use futures::StreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, BodyStream, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::{HeaderMap, Request, Response};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::client::legacy::Error as LegacyError;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::s3::types::{RawResponse, RequestBody, RequestDescriptor, Result, S3Error};

/// Wire body type: empty, buffered, or streamed
type OutboundBody = BoxBody<Bytes, std::io::Error>;

/// Connect timeout for new connections
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Accounting window for stall detection
const STALL_WINDOW: Duration = Duration::from_secs(30);

/// Bytes a stall window must move to keep the transfer alive: one byte per
/// second over the window
const STALL_FLOOR: u64 = STALL_WINDOW.as_secs();

/// Chunk size for streamed file bodies
const FILE_CHUNK: usize = 64 * 1024;

/// Byte counter shared between the transfer streams and the stall watchdog
#[derive(Clone)]
struct ProgressMeter(Arc<Mutex<u64>>);

impl ProgressMeter {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(0)))
    }

    fn record(&self, bytes: usize) {
        *self.0.lock().unwrap() += bytes as u64;
    }

    /// Bytes moved since the previous drain; resets the counter
    fn drain(&self) -> u64 {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Connection-multiplexing HTTP handle scoped to one client instance
///
/// Clone is cheap - the underlying HTTP client uses Arc internally.
#[derive(Clone)]
pub struct Transport {
    client: HyperClient<HttpsConnector<HttpConnector>, OutboundBody>,
    endpoint: String,
    stall_window: Duration,
}

impl Transport {
    /// Acquire the connection handle for the given endpoint.
    ///
    /// Nothing is acquired on failure, so a failed construction leaves no
    /// resource behind.
    pub fn new(endpoint: &str) -> Result<Self> {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(CONNECT_TIMEOUT));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = TlsConnector::new()
            .map_err(|e| S3Error::Transport(format!("TLS initialization failed: {}", e)))?;
        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .set_host(true)
            .build(https);

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            stall_window: STALL_WINDOW,
        })
    }

    /// Execute one signed request and capture the raw response.
    ///
    /// Returns `Err` only for wire-level failures (connect, TLS, stall,
    /// local file reads); any HTTP status comes back as a `RawResponse` for
    /// the caller to classify.
    pub async fn execute(&self, request: RequestDescriptor) -> Result<RawResponse> {
        let url = self.build_url(&request.resource);
        let method = request.method.clone();
        let started = Instant::now();

        let meter = ProgressMeter::new();
        let (body, content_length) = outbound_body(request.body, &meter);

        let mut builder = Request::builder().method(request.method).uri(&url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(length) = content_length {
            builder = builder.header("content-length", length.to_string());
        }
        let outbound = builder.body(body)?;

        let response = self.await_head(self.client.request(outbound), &meter).await?;
        let status = response.status();
        let headers = collapse_headers(response.headers());
        let body = self.collect_body(response.into_body(), &meter).await?;

        debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request complete"
        );

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    /// Endpoint and resource joined with exactly one slash
    fn build_url(&self, resource: &str) -> String {
        let mut url = String::with_capacity(self.endpoint.len() + resource.len() + 1);
        url.push_str(&self.endpoint);
        url.push('/');
        url.push_str(resource);
        url
    }

    /// Await the response head in stall-window slices.
    ///
    /// Each expired window drains the meter; fewer bytes moved than the
    /// floor means the transfer is dead and the call aborts. A slow but
    /// live upload keeps the meter fed, so large transfers are not cut off
    /// by total elapsed time.
    async fn await_head<F>(&self, future: F, meter: &ProgressMeter) -> Result<Response<Incoming>>
    where
        F: Future<Output = std::result::Result<Response<Incoming>, LegacyError>>,
    {
        tokio::pin!(future);
        loop {
            match tokio::time::timeout(self.stall_window, &mut future).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(error)) => {
                    warn!(error = %error, "request failed");
                    return Err(error.into());
                }
                Err(_) => {
                    if meter.drain() < STALL_FLOOR {
                        warn!(seconds = self.stall_window.as_secs(), "transfer stalled, aborting");
                        return Err(S3Error::Stalled(self.stall_window));
                    }
                }
            }
        }
    }

    /// Drain the response body under the same minimum-throughput policy.
    ///
    /// Window deadlines are absolute: a frame landing inside a window feeds
    /// the meter but does not extend the window.
    async fn collect_body(&self, body: Incoming, meter: &ProgressMeter) -> Result<Bytes> {
        let mut stream = BodyStream::new(body);
        let mut collected: Vec<u8> = Vec::new();
        let mut deadline = tokio::time::Instant::now() + self.stall_window;

        loop {
            match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(Some(frame)) => {
                    if let Some(chunk) = frame?.data_ref() {
                        meter.record(chunk.len());
                        collected.extend_from_slice(chunk);
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    if meter.drain() < STALL_FLOOR {
                        warn!(seconds = self.stall_window.as_secs(), "transfer stalled, aborting");
                        return Err(S3Error::Stalled(self.stall_window));
                    }
                    deadline += self.stall_window;
                }
            }
        }

        Ok(Bytes::from(collected))
    }
}

/// Build the wire body.
///
/// Returns the body plus an explicit content length where one must be set:
/// streamed files advertise no size of their own, and identity framing is
/// required for the signature to stay valid end to end.
fn outbound_body(body: RequestBody, meter: &ProgressMeter) -> (OutboundBody, Option<u64>) {
    match body {
        RequestBody::Empty => (empty_body(), None),
        RequestBody::Bytes(bytes) => {
            let length = bytes.len() as u64;
            let body = Full::new(bytes).map_err(|never| match never {}).boxed();
            (body, Some(length))
        }
        RequestBody::File(file, length) => {
            let meter = meter.clone();
            let stream = ReaderStream::with_capacity(file, FILE_CHUNK).map(move |chunk| {
                if let Ok(data) = &chunk {
                    meter.record(data.len());
                }
                chunk.map(Frame::data)
            });
            // StreamBody is both a Body and a Stream; name the trait so
            // boxing picks the body form.
            (BodyExt::boxed(StreamBody::new(stream)), Some(length))
        }
    }
}

/// Empty wire body
fn empty_body() -> OutboundBody {
    Full::new(Bytes::new()).map_err(|never| match never {}).boxed()
}

/// Response headers verbatim: lowercase names, duplicate values comma-joined
fn collapse_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers.iter() {
        let text = String::from_utf8_lossy(value.as_bytes());
        match map.entry(name.as_str().to_string()) {
            Entry::Occupied(mut slot) => {
                let joined = slot.get_mut();
                joined.push_str(", ");
                joined.push_str(&text);
            }
            Entry::Vacant(slot) => {
                slot.insert(text.into_owned());
            }
        }
    }
    map
}
