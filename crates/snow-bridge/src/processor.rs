//! Batch processing of alerts into incidents.
//!
//! Alerts are ordered by start time, then handled one at a time. The first
//! alert that cannot be extracted or published stops the batch; tickets
//! already created for earlier alerts stay in place.

use std::sync::Arc;
use tracing::{debug, info};

use crate::alert::Alert;
use crate::error::ProcessingError;
use crate::extract::{extract_values, ExtractedValues};
use crate::incident::{IncidentPublisher, IncidentRequest};
use crate::key::{derive_key, location_or_sentinel};
use crate::sequence::order_by_start;

/// Turns alert batches into tickets.
#[derive(Clone)]
pub struct AlertProcessor {
    publisher: Arc<dyn IncidentPublisher>,
}

impl AlertProcessor {
    /// Create a processor that opens tickets through `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<dyn IncidentPublisher>) -> Self {
        Self { publisher }
    }

    /// Create one ticket per alert, oldest alert first.
    ///
    /// Returns the number of tickets created.
    pub async fn process_alerts(&self, alerts: Vec<Alert>) -> Result<usize, ProcessingError> {
        let alerts = order_by_start(alerts);
        debug!(count = alerts.len(), "alerts have been sorted");

        let mut created = 0;
        for alert in &alerts {
            let values =
                extract_values(alert).map_err(|source| ProcessingError::Extraction {
                    fingerprint: alert.fingerprint.clone(),
                    source,
                })?;

            debug!(
                fingerprint = %alert.fingerprint,
                platform = %values.platform(),
                service = %values.service(),
                facet = %values.facet(),
                "extracted values for alert"
            );

            let request = incident_request(&values);

            self.publisher
                .create_incident(&request)
                .await
                .map_err(|source| ProcessingError::IncidentCreation {
                    fingerprint: alert.fingerprint.clone(),
                    source,
                })?;

            created += 1;
        }

        info!(
            publisher = self.publisher.name(),
            incidents = created,
            "alert batch processed"
        );

        Ok(created)
    }
}

/// Build the ticket for one alert's extracted values.
#[must_use]
pub fn incident_request(values: &ExtractedValues) -> IncidentRequest {
    let location = location_or_sentinel(values.location());
    let key = derive_key(
        values.platform(),
        values.service(),
        values.facet(),
        values.status(),
        location,
    );
    debug!(key = %key, "service key created");

    IncidentRequest::new(format!(
        "recording event for => {key}:{}:{}:{}:{location}",
        values.service(),
        values.facet(),
        values.status(),
    ))
}
