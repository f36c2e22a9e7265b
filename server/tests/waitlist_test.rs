//! HTTP tests for the waitlist service.
//!
//! The router is driven in-process against a store backed by the
//! in-memory remote.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, Request, StatusCode},
    routing::post,
    Json, Router,
};
use gitdoc_server::config::Config;
use gitdoc_server::handlers::{CountResponse, SubscribeResponse};
use gitdoc_server::{app, AppState};
use gitdoc_store::{DocStore, Document, Injected, MemoryRemote, StoreConfig};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

const PATH: &str = "db/waitlist.json";
const SECRET: &str = "s3cret";

struct TestApp {
    remote: Arc<MemoryRemote>,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let remote = Arc::new(MemoryRemote::new());
        let mut config = Config::new(StoreConfig::new("acme", "site", "t0k3n"));
        config.auth_secret = Some(SECRET.to_string());
        configure(&mut config);

        let store = DocStore::with_remote(config.store.clone(), remote.clone());
        Self {
            remote,
            state: AppState::new(store, config),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = app(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn subscribe(&self, body: Value) -> (StatusCode, SubscribeResponse) {
        let request = Request::builder()
            .method("POST")
            .uri("/waitlist")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body) = self.send(request).await;
        (status, serde_json::from_value(body).unwrap())
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    fn stored(&self) -> Vec<Document> {
        self.remote.documents(PATH).unwrap_or_default()
    }
}

// ============================================================================
// Sign-up
// ============================================================================

#[tokio::test]
async fn subscribe_stores_normalized_record() {
    let app = TestApp::new();

    let (status, body) = app
        .subscribe(json!({"email": "  New.Person@Example.COM ", "userAgent": "curl/8"}))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body.success);
    assert_eq!(body.message, "Successfully subscribed to waitlist!");

    let stored = app.stored();
    assert_eq!(stored.len(), 1);
    let record = &stored[0];
    assert_eq!(record["id"], "1");
    assert!(record["uid"].is_string());
    assert_eq!(record["email"], "new.person@example.com");
    assert_eq!(record["userAgent"], "curl/8");
    assert_eq!(record["source"], "coming-soon-page");
    assert!(record["subscribedAt"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn subscribe_reads_client_headers() {
    let app = TestApp::new();

    let request = Request::builder()
        .method("POST")
        .uri("/waitlist")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "Mozilla/5.0")
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .body(Body::from(json!({"email": "a@b.com"}).to_string()))
        .unwrap();
    let (status, _) = app.send(request).await;

    assert_eq!(status, StatusCode::CREATED);
    let record = &app.stored()[0];
    assert_eq!(record["userAgent"], "Mozilla/5.0");
    assert_eq!(record["ipAddress"], "203.0.113.7");
}

#[tokio::test]
async fn invalid_email_is_rejected_without_writing() {
    let app = TestApp::new();

    for email in ["", "not-an-email", "a@b", "a b@c.com"] {
        let (status, body) = app.subscribe(json!({"email": email})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{email:?}");
        assert!(!body.success);
        assert_eq!(body.message, "Please enter a valid email address.");
    }

    assert_eq!(app.remote.put_count(), 0);
}

#[tokio::test]
async fn duplicate_email_is_rejected_case_insensitively() {
    let app = TestApp::new();
    app.subscribe(json!({"email": "dup@example.com"})).await;

    let (status, body) = app.subscribe(json!({"email": "DUP@Example.com"})).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(!body.success);
    assert_eq!(body.message, "This email is already subscribed to our waitlist.");
    assert_eq!(app.stored().len(), 1);
}

#[tokio::test]
async fn duplicate_check_sees_mixed_case_records() {
    let app = TestApp::new();
    app.remote.seed(
        PATH,
        vec![json!({"id": "1", "uid": "u-1", "email": "Old@Example.com"})
            .as_object()
            .cloned()
            .unwrap()],
    );

    let (status, _) = app.subscribe(json!({"email": "old@example.com"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn storage_failure_reports_generic_error() {
    let app = TestApp::new();
    app.remote.fail_fetches(PATH, [Injected::Status(503)]);

    let (status, body) = app.subscribe(json!({"email": "a@b.com"})).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.success);
    assert_eq!(body.message, "An error occurred. Please try again later.");
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn count_tracks_subscribers() {
    let app = TestApp::new();

    let (status, body) = app.get("/waitlist/count", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_value::<CountResponse>(body).unwrap().count, 0);

    app.subscribe(json!({"email": "one@example.com"})).await;
    app.subscribe(json!({"email": "two@example.com"})).await;

    let (_, body) = app.get("/waitlist/count", None).await;
    assert_eq!(body, json!({"count": 2}));
}

#[tokio::test]
async fn count_is_zero_when_store_fails() {
    let app = TestApp::new();
    app.remote.fail_fetches(PATH, [Injected::Status(500)]);

    let (status, body) = app.get("/waitlist/count", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"count": 0}));
}

#[tokio::test]
async fn list_requires_bearer_token() {
    let app = TestApp::new();
    app.subscribe(json!({"email": "a@b.com"})).await;

    let (status, _) = app.get("/waitlist", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/waitlist", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.get("/waitlist", Some(SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["subscribers"][0]["email"], "a@b.com");
    assert_eq!(body["subscribers"][0]["id"], "1");
}

#[tokio::test]
async fn list_is_closed_without_configured_secret() {
    let app = TestApp::with_config(|config| config.auth_secret = None);

    let (status, body) = app.get("/waitlist", Some("anything")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn list_surfaces_storage_failure() {
    let app = TestApp::new();
    app.remote.fail_fetches(PATH, [Injected::Status(500)]);

    let (status, body) = app.get("/waitlist", Some(SECRET)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Storage unavailable");
}

#[tokio::test]
async fn health_reports_store_status() {
    let app = TestApp::new();

    let (status, body) = app.get("/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"]["owner"], "acme");
    assert_eq!(body["store"]["repo"], "site");
    assert_eq!(body["connections"], 0);
}

// ============================================================================
// Notifications
// ============================================================================

async fn spawn_relay(status: StatusCode) -> (String, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let relay = Router::new()
        .route(
            "/send",
            post(
                move |State(tx): State<mpsc::UnboundedSender<Value>>, Json(body): Json<Value>| async move {
                    let _ = tx.send(body);
                    status
                },
            ),
        )
        .with_state(tx);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, relay).await.unwrap();
    });
    (format!("http://{addr}/send"), rx)
}

#[tokio::test]
async fn subscribe_notifies_admin() {
    let (endpoint, mut emails) = spawn_relay(StatusCode::OK).await;
    let app = TestApp::with_config(|config| {
        config.smtp_endpoint = Some(endpoint);
        config.smtp_from = Some("team@example.com".into());
        config.admin_email = Some("admin@example.com".into());
    });

    let (status, _) = app
        .subscribe(json!({"email": "fan@example.com", "userAgent": "<b>bot</b>"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let email = emails.recv().await.unwrap();
    assert_eq!(email["to"], "admin@example.com");
    assert_eq!(email["from"], "team@example.com");
    assert_eq!(email["subject"], "New Waitlist Subscription");
    assert_eq!(email["headers"]["Reply-To"], "team@example.com");
    let html = email["html"].as_str().unwrap();
    assert!(html.contains("fan@example.com"));
    assert!(html.contains("&lt;b&gt;bot&lt;/b&gt;"));
}

#[tokio::test]
async fn rejected_notification_does_not_fail_signup() {
    let (endpoint, mut emails) = spawn_relay(StatusCode::INTERNAL_SERVER_ERROR).await;
    let app = TestApp::with_config(|config| {
        config.smtp_endpoint = Some(endpoint);
        config.admin_email = Some("admin@example.com".into());
    });

    let (status, body) = app.subscribe(json!({"email": "fan@example.com"})).await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body.success);
    assert!(emails.recv().await.is_some());
    assert_eq!(app.stored().len(), 1);
}

#[tokio::test]
async fn no_admin_address_means_no_email() {
    let (endpoint, mut emails) = spawn_relay(StatusCode::OK).await;
    let app = TestApp::with_config(|config| config.smtp_endpoint = Some(endpoint));

    app.subscribe(json!({"email": "fan@example.com"})).await;

    assert!(emails.try_recv().is_err());
}
