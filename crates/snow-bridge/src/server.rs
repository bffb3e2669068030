//! HTTP server for Alertmanager webhooks.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::alert::AlertBatch;
use crate::auth::{authenticate, AuthOutcome, REALM};
use crate::config::Config;
use crate::error::ProcessingError;
use crate::metrics::{PrometheusObserver, RequestObserver};
use crate::processor::AlertProcessor;

/// Upper bound on answering a probe or metrics scrape. The webhook route has
/// no such bound: a batch always runs to completion or to its first failure.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Body of the readiness and webhook responses while not ready.
pub const NOT_READY_MESSAGE: &str = "Service Status WebHook Receiver is not ready";

/// Shared readiness flag, flipped by the binary around the serve loop.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn mark_not_ready(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Configuration.
    pub config: Arc<Config>,
    /// Alert batch processor.
    pub processor: AlertProcessor,
    /// Told about rejected requests.
    pub observer: Arc<dyn RequestObserver>,
    /// Registry served on `/metrics` when metrics are enabled.
    pub metrics: Option<PrometheusObserver>,
    /// Readiness flag.
    pub readiness: Readiness,
}

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    let mut probes = Router::new()
        .route("/live", get(live_handler))
        .route("/ready", get(ready_handler));

    if state.config.metrics {
        probes = probes.route("/metrics", get(metrics_handler));
    }

    let probes = probes.layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        PROBE_TIMEOUT,
    ));

    Router::new()
        .route(&state.config.webhook_route(), post(webhook_handler))
        .merge(probes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reasons a webhook request was not accepted.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The service has not finished starting, or is shutting down
    #[error("Service Status WebHook Receiver is not ready")]
    NotReady,

    /// No credentials were supplied
    #[error("authentication required")]
    Unauthorized,

    /// The supplied credentials are wrong
    #[error("invalid credentials")]
    Forbidden,

    /// The payload is not a valid Alertmanager document
    #[error("cannot read the alerts in the payload: {0}")]
    Decoding(#[from] serde_json::Error),

    /// An alert in the batch could not be turned into a ticket
    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        match self {
            Self::NotReady => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
            }
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, format!("Basic realm=\"{REALM}\""))],
            )
                .into_response(),
            Self::Forbidden => StatusCode::FORBIDDEN.into_response(),
            Self::Decoding(_) | Self::Processing(_) => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
        }
    }
}

/// Liveness probe.
async fn live_handler() -> &'static str {
    "OK"
}

/// Readiness probe.
async fn ready_handler(State(state): State<AppState>) -> Result<&'static str, RequestError> {
    if state.readiness.is_ready() {
        Ok("OK")
    } else {
        warn!("{NOT_READY_MESSAGE}");
        Err(RequestError::NotReady)
    }
}

/// Prometheus exposition.
async fn metrics_handler(State(state): State<AppState>) -> (StatusCode, String) {
    let Some(metrics) = &state.metrics else {
        return (StatusCode::NOT_FOUND, String::new());
    };
    match metrics.render() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Alertmanager webhook receiver.
///
/// This handler:
/// 1. Refuses work until the service is ready
/// 2. Checks Basic credentials when enabled
/// 3. Decodes the payload and processes the alerts oldest first
pub async fn webhook_handler(
    State(state): State<AppState>,
    Path(partition): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, RequestError> {
    if !state.readiness.is_ready() {
        warn!("{NOT_READY_MESSAGE}");
        return Err(RequestError::NotReady);
    }

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    match authenticate(
        &state.config.auth_mode,
        &state.config.username,
        &state.config.password,
        authorization,
    ) {
        AuthOutcome::Allowed => {}
        AuthOutcome::Challenge => {
            debug!("Unauthorised request");
            return Err(RequestError::Unauthorized);
        }
        AuthOutcome::Forbidden => {
            warn!("Request with invalid credentials");
            return Err(RequestError::Forbidden);
        }
    }

    let batch: AlertBatch = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => {
            error!(error = %e, "cannot read the alerts in the payload");
            state.observer.bad_request();
            return Err(RequestError::Decoding(e));
        }
    };

    info!(
        partition = %partition,
        alerts = batch.alerts.len(),
        receiver = %batch.receiver,
        "Received alert webhook"
    );

    // Kept for the debug dump; the processor consumes the alerts.
    let dump = state.config.debug_level().then(|| batch.clone());

    if let Err(e) = state.processor.process_alerts(batch.alerts).await {
        error!(error = %e, "cannot process alerts");
        match dump {
            Some(batch) => match serde_json::to_string(&batch) {
                Ok(payload) => debug!(payload = %payload, "alert payload was"),
                Err(e) => error!(error = %e, "cannot dump alerts to output for debugging"),
            },
            None => info!("set log level to 'debug' to see the failed alerts content"),
        }
        state.observer.bad_request();
        return Err(RequestError::Processing(e));
    }

    Ok(StatusCode::NO_CONTENT)
}
