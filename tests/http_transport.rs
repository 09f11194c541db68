//! HttpApi against a real local HTTP server.
//!
//! A `tiny_http` server runs on a background thread, answers from a fixed
//! route table, and records every request so the tests can check paths,
//! methods and the Authorization header actually sent over the wire.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chemviz::api::http::HttpApi;
use chemviz::api::{DatasetApi, UploadFile};
use chemviz::auth::{basic_auth_value, CredentialStore};
use chemviz::config::ClientConfig;
use chemviz::dashboard::Dashboard;
use chemviz::summary_cache::{CacheEntry, SummaryCache};
use chemviz::upload::{UploadController, UploadStatus};
use chemviz::ClientError;
use tiny_http::{Header, Response, Server};

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    url: String,
    auth: Option<String>,
    body: String,
}

struct FakeServer {
    base: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl FakeServer {
    fn requests(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn count(&self, url: &str) -> usize {
        self.requests().iter().filter(|s| s.url == url).count()
    }
}

const DATASETS: &str = r#"[{"id": 1, "original_filename": "pumps.csv",
    "uploaded_at": "2024-01-01T00:00:00Z", "pdf_report": "http://x/1.pdf",
    "summary_json": "{}", "file": "http://x/pumps.csv"}]"#;

const SUMMARY: &str = r#"{"total_count": 42,
    "type_distribution": {"Pump": 30, "Valve": 12},
    "averages": {"flow_rate": 3.5}, "columns": ["Type", "flow_rate"]}"#;

fn route(method: &str, url: &str, body: &str) -> (u16, String) {
    match (method, url) {
        ("GET", "/api/datasets/") => (200, DATASETS.to_string()),
        ("GET", "/api/datasets/1/summary/") => (200, SUMMARY.to_string()),
        ("GET", "/api/datasets/2/summary/") => (403, r#"{"detail":"forbidden"}"#.to_string()),
        ("GET", "/api/datasets/3/summary/") => (200, "not json".to_string()),
        ("GET", "/api/datasets/1/report/") => (200, r#"{"report_url":"http://x/r1.pdf"}"#.to_string()),
        ("POST", "/api/upload/") if body.contains("filename=\"bad.csv\"") => {
            (400, r#"{"error":"No file provided"}"#.to_string())
        }
        ("POST", "/api/upload/") => (
            201,
            r#"{"id": 9, "original_filename": "pumps.csv",
                "uploaded_at": "2024-02-01T12:00:00Z", "pdf_report": null}"#
                .to_string(),
        ),
        _ => (404, String::new()),
    }
}

/// Serve `route` for requests carrying `expected_auth`; anything else is 401.
fn spawn_server(expected_auth: &str) -> FakeServer {
    let server = Server::http("127.0.0.1:0").expect("bind test server");
    let addr = server.server_addr().to_ip().expect("ip listener");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let expected = expected_auth.to_string();

    thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = String::new();
            let _ = request.as_reader().read_to_string(&mut body);
            let auth = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Authorization"))
                .map(|h| h.value.as_str().to_string());
            let method = request.method().to_string();
            let url = request.url().to_string();

            let (status, payload) = if auth.as_deref() == Some(expected.as_str()) {
                route(&method, &url, &body)
            } else {
                (401, r#"{"detail":"Invalid username/password."}"#.to_string())
            };
            log.lock().unwrap().push(Seen { method, url, auth, body });

            let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            let _ = request.respond(
                Response::from_string(payload)
                    .with_status_code(status)
                    .with_header(header),
            );
        }
    });

    FakeServer {
        base: format!("http://{}/api", addr),
        seen,
    }
}

/// Accept connections and never answer. Returns the API base and a counter
/// of accepted connections.
fn spawn_silent_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind silent server");
    let addr = listener.local_addr().expect("local addr");
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    (format!("http://{}/api", addr), accepted)
}

fn short_timeout_api(base: &str) -> Arc<dyn DatasetApi> {
    let cfg = ClientConfig {
        timeout_secs: 1,
        ..ClientConfig::with_base(base)
    };
    Arc::new(HttpApi::new(cfg).unwrap())
}

fn http_api(server: &FakeServer) -> HttpApi {
    HttpApi::new(ClientConfig::with_base(&server.base)).unwrap()
}

#[tokio::test]
async fn test_list_sends_basic_auth() {
    let auth = basic_auth_value("alice", "secret");
    let server = spawn_server(&auth);
    let api = http_api(&server);

    let list = api.list_datasets(&auth).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].original_filename, "pumps.csv");

    let seen = server.requests();
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].url, "/api/datasets/");
    assert_eq!(seen[0].auth.as_deref(), Some("Basic YWxpY2U6c2VjcmV0"));
}

#[tokio::test]
async fn test_summary_success_and_errors() {
    let auth = basic_auth_value("alice", "secret");
    let server = spawn_server(&auth);
    let api = http_api(&server);

    let summary = api.fetch_summary(1, &auth).await.unwrap();
    assert_eq!(summary.total_count, 42);
    assert_eq!(summary.type_distribution["Valve"], 12);

    assert_eq!(
        api.fetch_summary(2, &auth).await,
        Err(ClientError::AuthOrServerError { status: 403 })
    );
    assert_eq!(
        api.fetch_summary(404, &auth).await,
        Err(ClientError::AuthOrServerError { status: 404 })
    );
    assert!(matches!(
        api.fetch_summary(3, &auth).await,
        Err(ClientError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_wrong_credentials_are_auth_errors() {
    let server = spawn_server(&basic_auth_value("alice", "secret"));
    let api = http_api(&server);
    let wrong = basic_auth_value("alice", "guess");

    assert_eq!(
        api.list_datasets(&wrong).await,
        Err(ClientError::AuthOrServerError { status: 401 })
    );
    let file = UploadFile {
        file_name: "pumps.csv".into(),
        contents: b"Type\nPump\n".to_vec(),
    };
    assert_eq!(
        api.upload(file, &wrong).await,
        Err(ClientError::UploadFailure("Invalid username/password.".into()))
    );
}

#[tokio::test]
async fn test_upload_is_multipart_file_field() {
    let auth = basic_auth_value("alice", "secret");
    let server = spawn_server(&auth);
    let api = http_api(&server);

    let file = UploadFile {
        file_name: "pumps.csv".into(),
        contents: b"Equipment Name,Type\nP-1,Pump\n".to_vec(),
    };
    let created = api.upload(file, &auth).await.unwrap().unwrap();
    assert_eq!(created.id, 9);
    assert!(created.pdf_report.is_none());

    let seen = server.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "POST");
    assert!(seen[0].body.contains("name=\"file\""));
    assert!(seen[0].body.contains("filename=\"pumps.csv\""));
    assert!(seen[0].body.contains("P-1,Pump"));
}

#[tokio::test]
async fn test_upload_rejection_reason() {
    let auth = basic_auth_value("alice", "secret");
    let server = spawn_server(&auth);
    let api = http_api(&server);

    let file = UploadFile {
        file_name: "bad.csv".into(),
        contents: Vec::new(),
    };
    assert_eq!(
        api.upload(file, &auth).await,
        Err(ClientError::UploadFailure("No file provided".into()))
    );
}

#[tokio::test]
async fn test_report_endpoint() {
    let auth = basic_auth_value("alice", "secret");
    let server = spawn_server(&auth);
    let api = http_api(&server);
    assert_eq!(api.report_url(1, &auth).await.unwrap(), "http://x/r1.pdf");
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let api = HttpApi::new(ClientConfig::with_base(format!("http://127.0.0.1:{}/api", port))).unwrap();
    assert!(matches!(
        api.list_datasets("Basic x").await,
        Err(ClientError::NetworkError(_))
    ));
}

#[tokio::test]
async fn test_dashboard_over_http() {
    let server = spawn_server(&basic_auth_value("alice", "secret"));
    let api: Arc<dyn DatasetApi> = Arc::new(http_api(&server));
    let mut dash = Dashboard::new(api);
    dash.credentials.set_username("alice");
    dash.credentials.set_password("secret");

    dash.refresh().await.unwrap();
    dash.toggle(1).unwrap();
    let summary = dash.expanded_summary().await.unwrap().unwrap();
    assert_eq!(summary.total_count, 42);

    dash.toggle(1).unwrap();
    dash.toggle(1).unwrap();
    dash.expanded_summary().await.unwrap().unwrap();
    assert_eq!(server.count("/api/datasets/1/summary/"), 1);
    assert!(server
        .requests()
        .iter()
        .all(|s| s.auth.as_deref() == Some("Basic YWxpY2U6c2VjcmV0")));
}

#[tokio::test]
async fn test_stalled_summary_fetch_fails_then_retries() {
    let (base, accepted) = spawn_silent_server();
    let cache = SummaryCache::new(
        short_timeout_api(&base),
        CredentialStore::with_credentials("alice", "secret"),
    );

    let err = cache.ensure_fetched(1).await.unwrap_err();
    assert!(matches!(err, ClientError::NetworkError(_)));
    assert!(matches!(
        cache.get(1),
        CacheEntry::Failed(ClientError::NetworkError(_))
    ));

    // Failed is not final: the next request goes out again.
    assert!(cache.ensure_fetched(1).await.is_err());
    assert_eq!(cache.fetch_count(), 2);
    assert!(accepted.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_stalled_upload_is_network_failure() {
    let (base, _accepted) = spawn_silent_server();
    let upload = UploadController::new(
        short_timeout_api(&base),
        CredentialStore::with_credentials("alice", "secret"),
    );
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "Equipment Name,Type").unwrap();
    writeln!(file, "P-1,Pump").unwrap();
    upload.select_file(file.path());

    let task = tokio::spawn({
        let upload = upload.clone();
        async move { upload.submit().await }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(upload.status(), UploadStatus::Uploading);

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::NetworkError(_)));
    match upload.status() {
        UploadStatus::Failure { reason } => assert!(reason.starts_with("Network error")),
        other => panic!("unexpected status {:?}", other),
    }
}
