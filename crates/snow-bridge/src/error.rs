//! Error types for the alert pipeline.

use thiserror::Error;

/// Errors raised while pulling required fields out of a single alert.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// No label with the required name exists
    #[error("cannot find '{0}' label in alert")]
    MissingField(String),

    /// The label exists but its value is empty
    #[error("label '{0}' has no value, check the Prometheus rule has the correct label")]
    EmptyField(String),
}

impl ExtractError {
    /// Name of the field the error refers to.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField(field) | Self::EmptyField(field) => field,
        }
    }
}

/// Errors raised while creating a ticket in the incident system.
#[derive(Debug, Error)]
pub enum IncidentError {
    /// The request body could not be encoded
    #[error("cannot encode incident request: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request never got a response
    #[error("incident request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The incident system answered with a non-success status
    #[error("incident system returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Errors that abort a batch of alerts.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// An alert in the batch lacked required data
    #[error("alert '{fingerprint}': {source}")]
    Extraction {
        fingerprint: String,
        #[source]
        source: ExtractError,
    },

    /// The ticket for an alert could not be created
    #[error("alert '{fingerprint}': {source}")]
    IncidentCreation {
        fingerprint: String,
        #[source]
        source: IncidentError,
    },
}

impl ProcessingError {
    /// Fingerprint of the alert that stopped the batch.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        match self {
            Self::Extraction { fingerprint, .. } | Self::IncidentCreation { fingerprint, .. } => {
                fingerprint
            }
        }
    }
}
