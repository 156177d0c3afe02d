//! Shared request/response vocabulary for the client pipeline

use bytes::Bytes;
use hyper::{Method, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Client errors: configuration and transport failures.
///
/// Protocol-level outcomes (4xx/5xx from the service) are not errors at this
/// level; they surface as [`Envelope`] values with error status.
#[derive(Error, Debug)]
pub enum S3Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transfer stalled: no progress for {0:?}")]
    Stalled(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, S3Error>;

impl From<hyper_util::client::legacy::Error> for S3Error {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        S3Error::Transport(err.to_string())
    }
}

impl From<hyper::Error> for S3Error {
    fn from(err: hyper::Error) -> Self {
        S3Error::Transport(err.to_string())
    }
}

/// Normalized response data: every structured body flattens into this
/// tagged variant, so callers never see parser-specific types.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Leaf text
    Scalar(String),
    /// Opaque body bytes (object GET)
    Bytes(Bytes),
    /// Element children keyed by tag name
    Map(BTreeMap<String, Value>),
    /// Repeated sibling elements
    List(Vec<Value>),
}

impl Value {
    /// Look up a key in a mapping node
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Leaf text, if this is a scalar node
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(text) => Some(text),
            _ => None,
        }
    }

    /// Raw bytes, if this is an opaque body node
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Sequence items, if this is a list node
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Scalar(String::new())
    }
}

/// Raw result of one executed request
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers, lowercase names, duplicate values comma-joined
    pub headers: BTreeMap<String, String>,
    /// Response body bytes
    pub body: Bytes,
}

/// Success/error flag carried by every envelope (0 = success, 1 = error)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
}

impl Status {
    /// Numeric form of the flag
    pub fn as_u8(self) -> u8 {
        match self {
            Status::Success => 0,
            Status::Error => 1,
        }
    }
}

/// Uniform result shape returned by every public operation
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Success/error flag
    pub status: Status,
    /// Raw HTTP status behind this outcome
    pub code: u16,
    /// Short outcome description; the provider's message on errors
    pub message: String,
    /// Normalized response data
    pub data: Value,
    /// Response headers, present only when the caller asked for them
    pub headers: Option<BTreeMap<String, String>>,
}

impl Envelope {
    /// Build a success envelope
    pub fn success(code: u16, message: impl Into<String>, data: Value) -> Self {
        Self {
            status: Status::Success,
            code,
            message: message.into(),
            data,
            headers: None,
        }
    }

    /// Build an error envelope
    pub fn error(code: u16, message: impl Into<String>, data: Value) -> Self {
        Self {
            status: Status::Error,
            code,
            message: message.into(),
            data,
            headers: None,
        }
    }

    /// Whether this outcome is a success
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Attach response headers for caller visibility
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }
}

/// Body attached to an outbound request
#[derive(Debug)]
pub enum RequestBody {
    /// No body (GET, HEAD, DELETE, bucket create)
    Empty,
    /// In-memory body
    Bytes(Bytes),
    /// Opened file streamed chunk by chunk; the length drives content-length
    File(tokio::fs::File, u64),
}

/// One outbound request: built per call, signed once, consumed once.
///
/// The resource path is stored percent-encoded without its leading slash;
/// signing and URL assembly both prepend exactly one, so the signed bytes
/// and the wire bytes cannot diverge. A descriptor must not be mutated after
/// signing: the signature covers the exact method/resource/header/date tuple.
#[derive(Debug)]
pub struct RequestDescriptor {
    /// HTTP method
    pub method: Method,
    /// Percent-encoded resource path (`bucket[/key]`, or empty for the root)
    pub resource: String,
    /// Header map, lowercase names, insertion overwrites
    pub headers: BTreeMap<String, String>,
    /// Request body
    pub body: RequestBody,
}

impl RequestDescriptor {
    /// Create a descriptor with no headers and no body
    pub fn new(method: Method, resource: impl Into<String>) -> Self {
        Self {
            method,
            resource: resource.into(),
            headers: BTreeMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// Add a header (name is lowercased; last write wins)
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Attach a body
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }
}
