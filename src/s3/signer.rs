//! AWS Signature Version 2 style request signing
//!
//! Builds the deterministic string-to-sign (method, content hash, content
//! type, date, canonical x-amz headers, resource path) and attaches
//! `Authorization: AWS <access>:<base64(HMAC-SHA1)>` plus an RFC-1123 `Date`
//! header to each outbound request.

use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::BTreeMap;

use crate::s3::types::RequestDescriptor;

type HmacSha1 = Hmac<Sha1>;

/// Hex lookup table for percent encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Signature V2 style signer
///
/// Owns the credential pair for the lifetime of the client. No Debug impl:
/// the secret key must never reach logs or panic output.
#[derive(Clone)]
pub struct S3SignerV2 {
    access_key: String,
    secret_key: String,
}

impl S3SignerV2 {
    /// Create a new signer
    pub fn new(access_key: String, secret_key: String) -> Self {
        Self {
            access_key,
            secret_key,
        }
    }

    /// Sign a request: stamps the current UTC time into `date` and writes the
    /// `authorization` header.
    ///
    /// The signature covers the exact (method, resource, headers, date) tuple;
    /// mutating the descriptor afterwards invalidates it.
    pub fn sign(&self, request: &mut RequestDescriptor) {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        self.sign_with_date(request, &date);
    }

    /// Sign with an explicit timestamp.
    ///
    /// The timestamp is signed material, so this is the seam for pinning it.
    pub fn sign_with_date(&self, request: &mut RequestDescriptor, date: &str) {
        request.headers.insert("date".to_string(), date.to_string());
        let signature = self.signature_for(request);
        request.headers.insert(
            "authorization".to_string(),
            format!("AWS {}:{}", self.access_key, signature),
        );
    }

    /// Base64 HMAC-SHA1 of the request's canonical string
    fn signature_for(&self, request: &RequestDescriptor) -> String {
        let canonical = string_to_sign(request);
        let digest = Self::hmac_sha1(self.secret_key.as_bytes(), canonical.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(digest)
    }

    /// HMAC-SHA1 returning a fixed-size array (no heap allocation)
    fn hmac_sha1(key: &[u8], msg: &[u8]) -> [u8; 20] {
        let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(msg);
        let result = mac.finalize().into_bytes();
        let mut output = [0u8; 20];
        output.copy_from_slice(&result);
        output
    }
}

/// Deterministic string-to-sign for a request.
///
/// Newline-separated, fixed order: method, content hash (empty if absent),
/// content type (empty if absent), date, one `name:value` line per x-amz
/// header, then the resource path with its leading slash. Header names are
/// lowercase and unique by construction, and iteration over the map is
/// already lexicographic, so the output depends only on the descriptor.
pub fn string_to_sign(request: &RequestDescriptor) -> String {
    let mut out = String::with_capacity(96 + request.resource.len());
    out.push_str(request.method.as_str());
    out.push('\n');
    out.push_str(header_or_empty(&request.headers, "content-md5"));
    out.push('\n');
    out.push_str(header_or_empty(&request.headers, "content-type"));
    out.push('\n');
    out.push_str(header_or_empty(&request.headers, "date"));
    out.push('\n');
    push_canonical_amz_headers(&mut out, &request.headers);
    out.push('/');
    out.push_str(&request.resource);
    out
}

/// Append the canonical x-amz header lines, one `name:value\n` each
fn push_canonical_amz_headers(out: &mut String, headers: &BTreeMap<String, String>) {
    for (name, value) in headers {
        if name.starts_with("x-amz-") {
            out.push_str(name);
            out.push(':');
            out.push_str(value.trim());
            out.push('\n');
        }
    }
}

fn header_or_empty<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> &'a str {
    headers.get(name).map(String::as_str).unwrap_or("")
}

/// Percent-encode a resource path, preserving `/` separators.
///
/// Unreserved characters (RFC 3986) pass through untouched. The encoded form
/// is used both for signing and on the wire, so the two always agree.
pub fn encode_resource(path: &str) -> String {
    let mut result = String::with_capacity(path.len() + 16);
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                result.push(byte as char);
            }
            _ => {
                result.push('%');
                result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
    result
}
