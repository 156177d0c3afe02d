//! Integration tests against a scripted loopback server
//!
//! A canned-response HTTP server stands in for the storage service so the
//! tests can observe exactly what goes over the wire: methods, paths,
//! signed headers, and the order of requests in composite operations.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use s3kit::{Config, S3Client, Value};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

const ONE_BUCKET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListAllMyBucketsResult><Owner><ID>owner</ID></Owner><Buckets><Bucket><Name>alpha</Name></Bucket></Buckets></ListAllMyBucketsResult>"#;

const TWO_BUCKETS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListAllMyBucketsResult><Owner><ID>owner</ID></Owner><Buckets><Bucket><Name>alpha</Name></Bucket><Bucket><Name>media</Name></Bucket></Buckets></ListAllMyBucketsResult>"#;

const SINGLE_OBJECT_LISTING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult><Name>media</Name><Contents><Key>pics/a.png</Key><Size>512</Size></Contents></ListBucketResult>"#;

const ACCESS_DENIED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>"#;

const NO_SUCH_KEY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>"#;

/// One scripted reply, served in order
#[derive(Clone)]
struct Canned {
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
    body: Bytes,
}

impl Canned {
    fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }
}

fn xml(status: u16, body: &str) -> Canned {
    Canned {
        status: StatusCode::from_u16(status).unwrap(),
        headers: vec![("content-type", "application/xml".to_string())],
        body: Bytes::from(body.to_string()),
    }
}

fn empty(status: u16) -> Canned {
    Canned {
        status: StatusCode::from_u16(status).unwrap(),
        headers: Vec::new(),
        body: Bytes::new(),
    }
}

fn binary(status: u16, content_type: &str, body: &'static [u8]) -> Canned {
    Canned {
        status: StatusCode::from_u16(status).unwrap(),
        headers: vec![("content-type", content_type.to_string())],
        body: Bytes::from_static(body),
    }
}

/// What the server saw for one request
#[derive(Clone)]
struct SeenRequest {
    method: Method,
    path: String,
    headers: BTreeMap<String, String>,
    body: Bytes,
}

#[derive(Clone)]
struct Script {
    replies: Arc<Mutex<VecDeque<Canned>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl Script {
    fn new(replies: Vec<Canned>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn handle(script: Script, req: Request<Incoming>) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let mut headers = BTreeMap::new();
    for (name, value) in req.headers() {
        if let Ok(text) = value.to_str() {
            headers.insert(name.as_str().to_string(), text.to_string());
        }
    }
    // Drain the body so uploads finish before the reply goes out
    let body = req.into_body().collect().await?.to_bytes();
    script.seen.lock().unwrap().push(SeenRequest {
        method,
        path,
        headers,
        body,
    });

    let reply = script
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Canned {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: Vec::new(),
            body: Bytes::from_static(b"unscripted request"),
        });

    let mut builder = Response::builder().status(reply.status);
    for (name, value) in &reply.headers {
        builder = builder.header(*name, value);
    }
    Ok(builder
        .body(Full::new(reply.body).map_err(|never| match never {}).boxed())
        .unwrap())
}

async fn spawn_server(script: Script) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(_) => break,
            };
            let script = script.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| handle(script.clone(), req));
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    format!("http://{}", addr)
}

/// Scripted server plus a client pointed at it, bucket `media`
async fn start(replies: Vec<Canned>) -> (Script, S3Client) {
    let script = Script::new(replies);
    let endpoint = spawn_server(script.clone()).await;
    let config = Config::new("AKID", "topsecret", endpoint, "https://cdn.example.com")
        .with_bucket("media");
    let client = S3Client::new(config).unwrap();
    (script, client)
}

#[tokio::test]
async fn test_list_buckets_single_and_multi_shapes() {
    // A lone <Bucket> element parses as a map rather than a list; both
    // shapes must normalize to the same flat name sequence.
    let (_, client) = start(vec![xml(200, ONE_BUCKET)]).await;
    let envelope = client.list_buckets(false).await.unwrap();
    assert!(envelope.is_success());
    assert!(envelope.headers.is_none());
    assert_eq!(
        envelope.data,
        Value::List(vec![Value::Scalar("alpha".to_string())])
    );

    let (_, client) = start(vec![xml(200, TWO_BUCKETS)]).await;
    let envelope = client.list_buckets(false).await.unwrap();
    assert_eq!(
        envelope.data,
        Value::List(vec![
            Value::Scalar("alpha".to_string()),
            Value::Scalar("media".to_string()),
        ])
    );
}

#[tokio::test]
async fn test_requests_carry_signature_and_date() {
    let (script, client) = start(vec![xml(200, TWO_BUCKETS)]).await;
    client.list_buckets(false).await.unwrap();

    let seen = script.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, Method::GET);
    assert_eq!(seen[0].path, "/");

    let authorization = &seen[0].headers["authorization"];
    assert!(authorization.starts_with("AWS AKID:"));
    // base64 of a 20-byte HMAC-SHA1 digest is always 28 characters
    let signature = authorization.rsplit(':').next().unwrap();
    assert_eq!(signature.len(), 28);

    assert!(seen[0].headers["date"].ends_with("GMT"));
}

#[tokio::test]
async fn test_get_object_returns_raw_bytes() {
    let (script, client) = start(vec![binary(200, "image/png", b"PNGDATA")]).await;

    let envelope = client.get_object("pics/a b.png", true).await.unwrap();
    assert!(envelope.is_success());
    assert_eq!(envelope.data, Value::Bytes(Bytes::from_static(b"PNGDATA")));

    let headers = envelope.headers.expect("headers requested");
    assert_eq!(headers.get("content-type").map(String::as_str), Some("image/png"));

    // The key is percent-encoded exactly once, slashes preserved
    let seen = script.seen();
    assert_eq!(seen[0].path, "/media/pics/a%20b.png");
}

#[tokio::test]
async fn test_missing_object_classified_as_error() {
    let (_, client) = start(vec![xml(404, NO_SUCH_KEY)]).await;

    let envelope = client.get_object("gone.txt", false).await.unwrap();
    assert!(!envelope.is_success());
    assert_eq!(envelope.status.as_u8(), 1);
    assert_eq!(envelope.code, 404);
    assert_eq!(envelope.message, "The specified key does not exist.");
    // The parsed error body stays available for diagnostics
    assert_eq!(
        envelope.data.get("Code").and_then(Value::as_str),
        Some("NoSuchKey")
    );
}

#[tokio::test]
async fn test_put_creates_absent_bucket_then_uploads() {
    let (script, client) = start(vec![
        xml(200, ONE_BUCKET), // media not listed
        empty(200),           // create bucket
        empty(200),           // upload
    ])
    .await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"quarterly report body").unwrap();
    file.flush().unwrap();

    let envelope = client
        .put_object(file.path(), "docs/report.pdf", false)
        .await
        .unwrap();
    assert!(envelope.is_success());
    assert_eq!(envelope.message, "Object uploaded");

    let seen = script.seen();
    let calls: Vec<(&Method, &str)> = seen
        .iter()
        .map(|request| (&request.method, request.path.as_str()))
        .collect();
    assert_eq!(
        calls,
        vec![
            (&Method::GET, "/"),
            (&Method::PUT, "/media"),
            (&Method::PUT, "/media/docs/report.pdf"),
        ]
    );

    // Upload streamed intact, with an explicit length
    assert_eq!(seen[2].body, Bytes::from_static(b"quarterly report body"));
    assert_eq!(
        seen[2].headers.get("content-length").map(String::as_str),
        Some("21")
    );
}

#[tokio::test]
async fn test_put_skips_create_for_present_bucket() {
    let (script, client) = start(vec![
        xml(200, TWO_BUCKETS), // media listed
        empty(200),            // upload
    ])
    .await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"data").unwrap();
    file.flush().unwrap();

    let envelope = client.put_object(file.path(), "plain.txt", false).await.unwrap();
    assert!(envelope.is_success());

    let seen = script.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].method, Method::PUT);
    assert_eq!(seen[1].path, "/media/plain.txt");
}

#[tokio::test]
async fn test_put_propagates_listing_failure() {
    let (script, client) = start(vec![xml(403, ACCESS_DENIED)]).await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"data").unwrap();
    file.flush().unwrap();

    let envelope = client.put_object(file.path(), "plain.txt", false).await.unwrap();
    assert!(!envelope.is_success());
    assert_eq!(envelope.code, 403);
    assert_eq!(envelope.message, "Access Denied");

    // Nothing past the failed listing ran
    assert_eq!(script.seen().len(), 1);
}

#[tokio::test]
async fn test_delete_expects_no_content() {
    let (script, client) = start(vec![
        empty(204), // object delete
        empty(200), // bucket delete answered with the wrong code
    ])
    .await;

    let envelope = client.delete_object("old.txt").await.unwrap();
    assert!(envelope.is_success());
    assert_eq!(envelope.code, 204);

    let envelope = client.delete_bucket("media").await.unwrap();
    assert!(!envelope.is_success());
    assert_eq!(envelope.code, 200);

    let seen = script.seen();
    assert_eq!(seen[0].method, Method::DELETE);
    assert_eq!(seen[0].path, "/media/old.txt");
    assert_eq!(seen[1].path, "/media");
}

#[tokio::test]
async fn test_copy_carries_source_uri_header() {
    let (script, client) = start(vec![empty(200)]).await;

    let envelope = client.copy_object("/old/a.png", "new/a.png").await.unwrap();
    assert!(envelope.is_success());

    let seen = script.seen();
    assert_eq!(seen[0].method, Method::PUT);
    assert_eq!(seen[0].path, "/media/new/a.png");
    assert_eq!(
        seen[0].headers.get("x-amz-copy-source").map(String::as_str),
        Some("media/old/a.png")
    );
}

#[tokio::test]
async fn test_move_copies_then_deletes() {
    let (script, client) = start(vec![
        empty(200), // copy
        empty(204), // delete source
    ])
    .await;

    let envelope = client.move_object("old.png", "new.png").await.unwrap();
    assert!(envelope.is_success());
    assert_eq!(envelope.message, "Object moved");

    let seen = script.seen();
    let calls: Vec<(&Method, &str)> = seen
        .iter()
        .map(|request| (&request.method, request.path.as_str()))
        .collect();
    assert_eq!(
        calls,
        vec![
            (&Method::PUT, "/media/new.png"),
            (&Method::DELETE, "/media/old.png"),
        ]
    );
}

#[tokio::test]
async fn test_move_short_circuits_when_copy_fails() {
    let (script, client) = start(vec![xml(404, NO_SUCH_KEY)]).await;

    let envelope = client.move_object("gone.png", "new.png").await.unwrap();
    assert!(!envelope.is_success());
    assert_eq!(envelope.code, 404);

    // The source must not be deleted after a failed copy
    assert_eq!(script.seen().len(), 1);
}

#[tokio::test]
async fn test_move_reports_failed_delete() {
    let (script, client) = start(vec![
        empty(200),             // copy
        xml(403, ACCESS_DENIED), // delete refused
    ])
    .await;

    // The object now exists under both names; the delete outcome is the
    // result the caller has to act on.
    let envelope = client.move_object("old.png", "new.png").await.unwrap();
    assert!(!envelope.is_success());
    assert_eq!(envelope.code, 403);
    assert_eq!(envelope.message, "Access Denied");
    assert_eq!(script.seen().len(), 2);
}

#[tokio::test]
async fn test_get_bucket_wraps_single_contents() {
    let (_, client) = start(vec![xml(200, SINGLE_OBJECT_LISTING)]).await;

    let envelope = client.get_bucket("media", true).await.unwrap();
    assert!(envelope.is_success());
    assert!(envelope.headers.is_some());

    let contents = envelope
        .data
        .get("Contents")
        .and_then(Value::as_list)
        .expect("contents always a list");
    assert_eq!(contents.len(), 1);
    assert_eq!(
        contents[0].get("Key").and_then(Value::as_str),
        Some("pics/a.png")
    );
}

#[tokio::test]
async fn test_object_info_returns_headers_as_data() {
    let reply = empty(200)
        .with_header("content-type", "image/png")
        .with_header("etag", "\"9a0364b9e99bb480dd25e1f0284c8555\"");
    let (script, client) = start(vec![reply]).await;

    let envelope = client.get_object_info("pics/a.png").await.unwrap();
    assert!(envelope.is_success());

    // Metadata is the payload of a HEAD, so it lands in data.
    assert_eq!(
        envelope.data.get("etag").and_then(Value::as_str),
        Some("\"9a0364b9e99bb480dd25e1f0284c8555\"")
    );
    assert_eq!(
        envelope.data.get("content-type").and_then(Value::as_str),
        Some("image/png")
    );
    assert!(envelope.headers.is_none());

    let seen = script.seen();
    assert_eq!(seen[0].method, Method::HEAD);
    assert_eq!(seen[0].path, "/media/pics/a.png");
}

#[tokio::test]
async fn test_object_info_error_carries_no_headers() {
    let reply = empty(404).with_header("content-type", "application/xml");
    let (_, client) = start(vec![reply]).await;

    let envelope = client.get_object_info("gone.png").await.unwrap();
    assert!(!envelope.is_success());
    assert_eq!(envelope.code, 404);
    assert!(envelope.headers.is_none());
}
