//! Response normalization
//!
//! Converts raw responses into the uniform envelope:
//! - XML bodies parse into nested `Value` trees (elements become map keys,
//!   repeated siblings become lists, leaf text becomes scalars)
//! - non-XML bodies stay opaque bytes, empty bodies an empty scalar
//! - the call is classified against the operation's expected success code,
//!   with the provider's `Message` surfaced on errors

use bytes::Bytes;
use hyper::StatusCode;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use tracing::warn;

use crate::s3::types::{Envelope, RawResponse, Value};

/// Normalize a raw response against the operation's expected success code.
///
/// `ok_message` becomes the envelope message on success; on a status mismatch
/// the provider's error message (or the HTTP reason phrase when the body has
/// none) is used instead, and `data` carries the full parsed error body.
pub fn normalize(
    raw: RawResponse,
    expected: StatusCode,
    ok_message: &str,
    with_headers: bool,
) -> Envelope {
    let RawResponse {
        status,
        headers,
        body,
    } = raw;

    let data = parse_body(&headers, &body);
    let mut envelope = if status == expected {
        Envelope::success(status.as_u16(), ok_message, data)
    } else {
        let message = error_message(&data, status);
        warn!(
            status = status.as_u16(),
            expected = expected.as_u16(),
            message = %message,
            "request rejected"
        );
        Envelope::error(status.as_u16(), message, data)
    };

    if with_headers {
        envelope = envelope.with_headers(headers);
    }
    envelope
}

/// Body to data: empty bodies normalize to an empty scalar, XML bodies to a
/// tree, everything else (object GET payloads, unparsable documents) is kept
/// as opaque bytes.
fn parse_body(headers: &BTreeMap<String, String>, body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::default();
    }
    if is_xml(headers, body) {
        match parse_xml(body) {
            Some(value) => return value,
            None => warn!(bytes = body.len(), "malformed XML body, keeping raw bytes"),
        }
    }
    Value::Bytes(body.clone())
}

/// XML detection: trust the content type when present, sniff otherwise
fn is_xml(headers: &BTreeMap<String, String>, body: &Bytes) -> bool {
    if let Some(ctype) = headers.get("content-type") {
        return ctype.contains("xml");
    }
    body.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'<')
}

/// Provider message for an error body, reason phrase as fallback
fn error_message(data: &Value, status: StatusCode) -> String {
    data.get("Message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

/// Parse an XML document into a `Value` tree.
///
/// The document element is dropped; its children form the top-level mapping.
/// Returns `None` for anything other than a single well-formed document, so
/// the caller can keep the raw bytes instead.
fn parse_xml(body: &[u8]) -> Option<Value> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    // Element stack: (name, children, accumulated text). The bottom frame is
    // synthetic and collects the document element itself.
    let mut stack: Vec<(String, BTreeMap<String, Value>, String)> =
        vec![(String::new(), BTreeMap::new(), String::new())];

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push((name, BTreeMap::new(), String::new()));
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let (_, children, _) = stack.last_mut()?;
                attach_child(children, name, Value::default());
            }
            Ok(Event::Text(e)) => {
                let text = match e.unescape() {
                    Ok(text) => text,
                    Err(_) => return None,
                };
                let (_, _, accumulated) = stack.last_mut()?;
                accumulated.push_str(&text);
            }
            Ok(Event::End(_)) => {
                let (name, children, text) = stack.pop()?;
                let value = if children.is_empty() {
                    Value::Scalar(text)
                } else {
                    Value::Map(children)
                };
                let (_, parent, _) = stack.last_mut()?;
                attach_child(parent, name, value);
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
    }

    // Exactly the synthetic frame left, holding exactly the document element.
    if stack.len() != 1 {
        return None;
    }
    let (_, mut roots, _) = stack.pop()?;
    if roots.len() != 1 {
        return None;
    }
    roots.pop_first().map(|(_, value)| value)
}

/// Insert a child value, promoting repeated sibling names to a sequence
fn attach_child(children: &mut BTreeMap<String, Value>, name: String, value: Value) {
    match children.get_mut(&name) {
        Some(Value::List(items)) => items.push(value),
        Some(existing) => {
            let first = std::mem::take(existing);
            *existing = Value::List(vec![first, value]);
        }
        None => {
            children.insert(name, value);
        }
    }
}
