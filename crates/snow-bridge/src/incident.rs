//! ServiceNow incident creation.
//!
//! The [`IncidentPublisher`] trait is the seam the batch processor talks to;
//! [`ServiceNowClient`] implements it against the ServiceNow table API.
//!
//! # Usage
//!
//! ```no_run
//! use snow_bridge::incident::{IncidentPublisher, IncidentRequest, ServiceNowClient};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = ServiceNowClient::new(
//!     "https://example.service-now.com",
//!     "bridge.user",
//!     "secret",
//!     std::time::Duration::from_secs(30),
//! )?;
//!
//! client
//!     .create_incident(&IncidentRequest::new("recording event for => aws_api_latency_firing__"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::IncidentError;

/// Table API resource incidents are created on.
pub const INCIDENT_TABLE_PATH: &str = "/api/now/v1/table/incident";

/// Urgency every ticket is opened with.
pub const DEFAULT_URGENCY: &str = "3-Low";

/// Caller every ticket is opened on behalf of.
pub const DEFAULT_CALLER: &str = "Creator User";

/// Body of a ticket creation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRequest {
    /// Ticket urgency
    #[serde(rename = "Urgency")]
    pub urgency: String,
    /// Caller the ticket is raised for
    #[serde(rename = "Caller")]
    pub caller: String,
    /// One-line summary shown in ticket lists
    pub short_description: String,
}

impl IncidentRequest {
    /// Create a request with the default urgency and caller.
    #[must_use]
    pub fn new(short_description: impl Into<String>) -> Self {
        Self {
            urgency: DEFAULT_URGENCY.to_string(),
            caller: DEFAULT_CALLER.to_string(),
            short_description: short_description.into(),
        }
    }
}

/// Something that can open a ticket in an incident system.
///
/// Implementations make exactly one attempt per call.
#[async_trait]
pub trait IncidentPublisher: Send + Sync {
    /// Name of the incident system, for logs.
    fn name(&self) -> &'static str;

    /// Create one ticket.
    async fn create_incident(&self, request: &IncidentRequest) -> Result<(), IncidentError>;
}

/// ServiceNow table API client.
#[derive(Clone)]
pub struct ServiceNowClient {
    endpoint: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for ServiceNowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceNowClient")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ServiceNowClient {
    /// Create a client for the instance at `base_url`.
    ///
    /// # Errors
    /// Returns error if the underlying HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, IncidentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: incident_endpoint(base_url),
            username: username.into(),
            password: password.into(),
            client,
        })
    }

    /// Full URL tickets are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Join the instance URL and the incident table path.
fn incident_endpoint(base_url: &str) -> String {
    format!("{}{INCIDENT_TABLE_PATH}", base_url.trim_end_matches('/'))
}

#[async_trait]
impl IncidentPublisher for ServiceNowClient {
    fn name(&self) -> &'static str {
        "servicenow"
    }

    async fn create_incident(&self, request: &IncidentRequest) -> Result<(), IncidentError> {
        let body = serde_json::to_vec(request)?;

        debug!(
            endpoint = %self.endpoint,
            short_description = %request.short_description,
            "Creating ServiceNow incident"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;

        if response.status().is_success() {
            debug!(status = %response.status(), "ServiceNow incident created");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            warn!(
                status = %status,
                body = %body,
                "ServiceNow incident request failed"
            );

            Err(IncidentError::Status { status, body })
        }
    }
}
