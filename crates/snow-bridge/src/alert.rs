//! Alertmanager webhook payload types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label or annotation set attached to an alert.
pub type KeyValues = BTreeMap<String, String>;

/// Alertmanager webhook payload.
///
/// Reference: <https://prometheus.io/docs/alerting/latest/configuration/#webhook_config>
///
/// Only `alerts` is required; the envelope fields are kept so the payload can
/// be dumped back out for diagnosis.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertBatch {
    /// Version of the payload format
    #[serde(default)]
    pub version: String,
    /// Unique identifier for this group of alerts
    #[serde(default)]
    pub group_key: String,
    /// Status: "firing" or "resolved"
    #[serde(default)]
    pub status: String,
    /// Receiver that matched this alert
    #[serde(default)]
    pub receiver: String,
    /// Labels common to all alerts in this group
    #[serde(default)]
    pub group_labels: KeyValues,
    /// Labels common to all alerts
    #[serde(default)]
    pub common_labels: KeyValues,
    /// Annotations common to all alerts
    #[serde(default)]
    pub common_annotations: KeyValues,
    /// External URL for Alertmanager
    #[serde(default, rename = "externalURL")]
    pub external_url: String,
    /// Alerts in this notification, in the order they were sent
    pub alerts: Vec<Alert>,
}

/// Individual alert from Alertmanager.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Unique fingerprint for this alert
    #[serde(default)]
    pub fingerprint: String,
    /// When the alert started firing
    pub starts_at: DateTime<Utc>,
    /// When the alert was resolved (if resolved)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    /// Status: "firing" or "resolved"
    #[serde(default)]
    pub status: String,
    /// Alert labels
    #[serde(default)]
    pub labels: KeyValues,
    /// Alert annotations
    #[serde(default)]
    pub annotations: KeyValues,
    /// URL of the rule that produced the alert
    #[serde(default, rename = "generatorURL")]
    pub generator_url: String,
}

impl Alert {
    /// Create an alert with empty label and annotation sets.
    #[must_use]
    pub fn new(fingerprint: impl Into<String>, starts_at: DateTime<Utc>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            starts_at,
            ends_at: None,
            status: "firing".to_string(),
            labels: KeyValues::new(),
            annotations: KeyValues::new(),
            generator_url: String::new(),
        }
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}
