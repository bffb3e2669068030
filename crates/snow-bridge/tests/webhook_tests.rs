//! Integration tests for the Alertmanager webhook receiver.
//!
//! These tests drive the full router in-process and point the ServiceNow
//! client at a mock incident API bound to a random local port.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use snow_bridge::auth::basic_token;
use snow_bridge::incident::INCIDENT_TABLE_PATH;
use snow_bridge::{
    build_router, AlertProcessor, AppState, Config, IncidentError, IncidentPublisher,
    IncidentRequest, PrometheusObserver, Readiness, RequestObserver, ServiceNowClient,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tracing_test::traced_test;

// =============================================================================
// Mock ServiceNow Server
// =============================================================================

/// A ticket creation call received by the mock.
#[derive(Debug, Clone)]
struct ReceivedIncident {
    authorization: Option<String>,
    body: Value,
}

/// Shared state for the mock incident API.
struct MockSnowState {
    received: Mutex<Vec<ReceivedIncident>>,
    status: AtomicU16,
}

impl MockSnowState {
    fn received(&self) -> Vec<ReceivedIncident> {
        self.received.lock().unwrap().clone()
    }

    fn descriptions(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|r| r.body["short_description"].as_str().unwrap().to_string())
            .collect()
    }

    fn respond_with(&self, status: StatusCode) {
        self.status.store(status.as_u16(), Ordering::SeqCst);
    }
}

/// Handle a ticket creation call.
async fn mock_create_incident(
    State(state): State<Arc<MockSnowState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.received.lock().unwrap().push(ReceivedIncident {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        body,
    });
    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst)).unwrap();
    (status, Json(json!({ "result": {} })))
}

/// Start a mock incident API on a random port.
async fn start_mock_snow() -> (SocketAddr, Arc<MockSnowState>) {
    let state = Arc::new(MockSnowState {
        received: Mutex::new(Vec::new()),
        status: AtomicU16::new(StatusCode::CREATED.as_u16()),
    });

    let app = Router::new()
        .route(INCIDENT_TABLE_PATH, post(mock_create_incident))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

// =============================================================================
// Helpers
// =============================================================================

fn test_config(snow_addr: SocketAddr) -> Config {
    Config {
        id: "snow-test".to_string(),
        log_level: "info".to_string(),
        auth_mode: "none".to_string(),
        path: "alerts".to_string(),
        port: 8080,
        username: "admin".to_string(),
        password: "pass".to_string(),
        metrics: true,
        snow_url: format!("http://{snow_addr}/"),
        snow_username: "snow.user".to_string(),
        snow_password: "snow.pass".to_string(),
        request_timeout_secs: 5,
        shutdown_grace_secs: 1,
    }
}

struct TestApp {
    router: Router,
    snow: Arc<MockSnowState>,
    metrics: PrometheusObserver,
    readiness: Readiness,
}

/// Router wired to `publisher`, with a fresh registry, marked ready.
fn app_with_publisher(
    config: Config,
    publisher: Arc<dyn IncidentPublisher>,
) -> (Router, PrometheusObserver, Readiness) {
    let metrics = PrometheusObserver::new().unwrap();
    let readiness = Readiness::default();
    readiness.mark_ready();

    let router = build_router(AppState {
        metrics: config.metrics.then(|| metrics.clone()),
        observer: Arc::new(metrics.clone()),
        processor: AlertProcessor::new(publisher),
        config: Arc::new(config),
        readiness: readiness.clone(),
    });

    (router, metrics, readiness)
}

async fn test_app(customize: impl FnOnce(&mut Config)) -> TestApp {
    let (addr, snow) = start_mock_snow().await;
    let mut config = test_config(addr);
    customize(&mut config);

    let publisher = ServiceNowClient::new(
        &config.snow_url,
        config.snow_username.clone(),
        config.snow_password.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )
    .unwrap();
    let (router, metrics, readiness) = app_with_publisher(config, Arc::new(publisher));

    TestApp {
        router,
        snow,
        metrics,
        readiness,
    }
}

/// Publisher whose every call takes `delay` to complete.
struct SlowPublisher {
    delay: Duration,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl SlowPublisher {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl IncidentPublisher for SlowPublisher {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn create_incident(&self, _request: &IncidentRequest) -> Result<(), IncidentError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn alert(fingerprint: &str, starts_at: &str, labels: Value) -> Value {
    json!({
        "status": "firing",
        "fingerprint": fingerprint,
        "startsAt": starts_at,
        "labels": labels,
        "annotations": {}
    })
}

fn complete_labels(service: &str) -> Value {
    json!({
        "platform": "aws",
        "service": service,
        "status": "firing",
        "facet": "latency",
        "description": "high latency"
    })
}

fn payload(alerts: Vec<Value>) -> Value {
    json!({
        "version": "4",
        "status": "firing",
        "receiver": "snow",
        "alerts": alerts
    })
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    authorization: Option<&str>,
    body: Body,
) -> (StatusCode, HeaderMap, String) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(authorization) = authorization {
        builder = builder.header(header::AUTHORIZATION, authorization);
    }

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn post_alerts(
    app: &Router,
    authorization: Option<&str>,
    body: &Value,
) -> (StatusCode, HeaderMap, String) {
    send(
        app,
        "POST",
        "/alerts/default",
        authorization,
        Body::from(body.to_string()),
    )
    .await
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_single_alert_creates_one_incident() {
    let app = test_app(|_| {}).await;

    let body = payload(vec![alert(
        "fp-1",
        "2024-05-01T10:00:00Z",
        complete_labels("api"),
    )]);
    let (status, _, text) = post_alerts(&app.router, None, &body).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(text.is_empty());

    let received = app.snow.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body["Urgency"], "3-Low");
    assert_eq!(received[0].body["Caller"], "Creator User");
    assert!(received[0].body["short_description"]
        .as_str()
        .unwrap()
        .contains("aws_api_latency_firing__"));
    assert_eq!(
        received[0].authorization.as_deref(),
        Some(basic_token("snow.user", "snow.pass").as_str())
    );
    assert_eq!(app.metrics.bad_requests(), 0);
}

#[tokio::test]
async fn test_alerts_are_published_oldest_first() {
    let app = test_app(|_| {}).await;

    let body = payload(vec![
        alert("t3", "2024-05-01T10:03:00Z", complete_labels("third")),
        alert("t1", "2024-05-01T10:01:00Z", complete_labels("first")),
        alert("t2", "2024-05-01T10:02:00Z", complete_labels("second")),
    ]);
    let (status, _, _) = post_alerts(&app.router, None, &body).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let descriptions = app.snow.descriptions();
    assert_eq!(descriptions.len(), 3);
    assert!(descriptions[0].contains("aws_first_"));
    assert!(descriptions[1].contains("aws_second_"));
    assert!(descriptions[2].contains("aws_third_"));
}

#[tokio::test]
async fn test_extraction_failure_aborts_remaining_alerts() {
    let app = test_app(|_| {}).await;

    let mut broken = complete_labels("second");
    broken.as_object_mut().unwrap().remove("facet");

    let body = payload(vec![
        alert("one", "2024-05-01T10:01:00Z", complete_labels("first")),
        alert("two", "2024-05-01T10:02:00Z", broken),
        alert("three", "2024-05-01T10:03:00Z", complete_labels("third")),
    ]);
    let (status, _, text) = post_alerts(&app.router, None, &body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text.contains("cannot find 'facet' label"), "body: {text}");
    assert!(text.contains("two"));

    let descriptions = app.snow.descriptions();
    assert_eq!(descriptions.len(), 1);
    assert!(descriptions[0].contains("aws_first_"));
    assert_eq!(app.metrics.bad_requests(), 1);
}

#[tokio::test]
async fn test_empty_label_is_reported() {
    let app = test_app(|_| {}).await;

    let mut labels = complete_labels("api");
    labels["service"] = json!("");

    let body = payload(vec![alert("fp", "2024-05-01T10:00:00Z", labels)]);
    let (status, _, text) = post_alerts(&app.router, None, &body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text.contains("label 'service' has no value"), "body: {text}");
    assert!(app.snow.received().is_empty());
}

#[tokio::test]
async fn test_incident_api_failure_is_a_bad_request() {
    let app = test_app(|_| {}).await;
    app.snow.respond_with(StatusCode::INTERNAL_SERVER_ERROR);

    let body = payload(vec![
        alert("one", "2024-05-01T10:01:00Z", complete_labels("first")),
        alert("two", "2024-05-01T10:02:00Z", complete_labels("second")),
    ]);
    let (status, _, text) = post_alerts(&app.router, None, &body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text.contains("500"), "body: {text}");
    assert_eq!(app.snow.received().len(), 1);
    assert_eq!(app.metrics.bad_requests(), 1);
}

#[tokio::test]
async fn test_malformed_payload_is_rejected_before_processing() {
    let app = test_app(|_| {}).await;

    let (status, _, text) = send(
        &app.router,
        "POST",
        "/alerts/default",
        None,
        Body::from("{ not json"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text.starts_with("cannot read the alerts in the payload"));
    assert!(app.snow.received().is_empty());
    assert_eq!(app.metrics.bad_requests(), 1);
}

#[tokio::test]
async fn test_basic_auth_challenge_forbidden_and_allowed() {
    let app = test_app(|config| config.auth_mode = "basic".to_string()).await;
    let body = payload(vec![alert(
        "fp",
        "2024-05-01T10:00:00Z",
        complete_labels("api"),
    )]);

    let (status, headers, _) = post_alerts(&app.router, None, &body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        headers.get(header::WWW_AUTHENTICATE).unwrap(),
        "Basic realm=\"SNOW\""
    );

    let wrong = basic_token("admin", "nope");
    let (status, _, _) = post_alerts(&app.router, Some(&wrong), &body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.snow.received().is_empty());

    let right = basic_token("admin", "pass");
    let (status, _, _) = post_alerts(&app.router, Some(&right), &body).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.snow.received().len(), 1);
    assert_eq!(app.metrics.bad_requests(), 0);
}

#[tokio::test]
async fn test_auth_is_checked_before_decoding() {
    let app = test_app(|config| config.auth_mode = "Basic".to_string()).await;

    let (status, _, _) = send(
        &app.router,
        "POST",
        "/alerts/default",
        Some("Basic bm9wZTpub3Bl"),
        Body::from("garbage"),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.metrics.bad_requests(), 0);
}

#[tokio::test]
async fn test_probes_follow_readiness() {
    let app = test_app(|_| {}).await;

    let (status, _, text) = send(&app.router, "GET", "/live", None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "OK");

    let (status, _, _) = send(&app.router, "GET", "/ready", None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);

    app.readiness.mark_not_ready();

    let (status, _, text) = send(&app.router, "GET", "/ready", None, Body::empty()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text, "Service Status WebHook Receiver is not ready");

    let body = payload(vec![alert(
        "fp",
        "2024-05-01T10:00:00Z",
        complete_labels("api"),
    )]);
    let (status, _, _) = post_alerts(&app.router, None, &body).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.snow.received().is_empty());
}

#[tokio::test]
async fn test_metrics_endpoint_toggle() {
    let app = test_app(|_| {}).await;
    app.metrics.bad_request();

    let (status, _, text) = send(&app.router, "GET", "/metrics", None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("snow_bad_requests_total 1"));

    let app = test_app(|config| config.metrics = false).await;
    let (status, _, _) = send(&app.router, "GET", "/metrics", None, Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_custom_webhook_path() {
    let app = test_app(|config| config.path = "/snow/".to_string()).await;
    let body = payload(vec![alert(
        "fp",
        "2024-05-01T10:00:00Z",
        complete_labels("api"),
    )]);

    let (status, _, _) = send(
        &app.router,
        "POST",
        "/snow/prod",
        None,
        Body::from(body.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = post_alerts(&app.router, None, &body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn test_slow_batch_runs_to_completion() {
    let publisher = Arc::new(SlowPublisher::new(Duration::from_secs(10)));
    let config = test_config(SocketAddr::from(([127, 0, 0, 1], 9)));
    let (router, metrics, _readiness) = app_with_publisher(config, publisher.clone());

    let body = payload(vec![
        alert("one", "2024-05-01T10:01:00Z", complete_labels("first")),
        alert("two", "2024-05-01T10:02:00Z", complete_labels("second")),
        alert("three", "2024-05-01T10:03:00Z", complete_labels("third")),
    ]);
    let started = tokio::time::Instant::now();
    let (status, _, _) = post_alerts(&router, None, &body).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(publisher.started.load(Ordering::SeqCst), 3);
    assert_eq!(publisher.finished.load(Ordering::SeqCst), 3);
    assert_eq!(metrics.bad_requests(), 0);
}

#[tokio::test]
#[traced_test]
async fn test_failed_batch_is_dumped_at_debug_level() {
    let app = test_app(|config| config.log_level = "debug".to_string()).await;

    let mut labels = complete_labels("api");
    labels.as_object_mut().unwrap().remove("platform");
    let body = payload(vec![alert("dumped-fp", "2024-05-01T10:00:00Z", labels)]);
    let (status, _, _) = post_alerts(&app.router, None, &body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(logs_contain("alert payload was"));
    assert!(logs_contain("\"fingerprint\":\"dumped-fp\""));
    assert!(!logs_contain("set log level to 'debug'"));
}

#[tokio::test]
#[traced_test]
async fn test_failed_batch_hints_at_debug_level_otherwise() {
    let app = test_app(|_| {}).await;

    let mut labels = complete_labels("api");
    labels.as_object_mut().unwrap().remove("platform");
    let body = payload(vec![alert("hidden-fp", "2024-05-01T10:00:00Z", labels)]);
    let (status, _, _) = post_alerts(&app.router, None, &body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(logs_contain("set log level to 'debug' to see the failed alerts content"));
    assert!(!logs_contain("alert payload was"));
}
