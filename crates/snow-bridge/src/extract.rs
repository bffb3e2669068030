//! Field extraction from a single alert.
//!
//! Label and annotation keys are compared case-insensitively. Labels are
//! normalised to lower case once per alert, then the required fields are
//! looked up, then annotations are merged in without overriding any label.

use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::alert::{Alert, KeyValues};
use crate::error::ExtractError;

/// Platform the affected resource runs on.
pub const PLATFORM: &str = "platform";
/// Service the alert concerns.
pub const SERVICE: &str = "service";
/// Reported status of the service.
pub const STATUS: &str = "status";
/// Human readable description.
pub const DESCRIPTION: &str = "description";
/// Facet (aspect) of the service being reported on.
pub const FACET: &str = "facet";
/// Optional location of the resource.
pub const LOCATION: &str = "location";

/// Labels every alert must carry, in lookup order.
pub const REQUIRED_FIELDS: [&str; 5] = [PLATFORM, SERVICE, STATUS, DESCRIPTION, FACET];

/// Values pulled out of one alert, keyed by lower-case field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedValues {
    values: BTreeMap<String, String>,
}

impl ExtractedValues {
    /// Value of a field, or the empty string when it was not captured.
    #[must_use]
    pub fn get(&self, field: &str) -> &str {
        self.values
            .get(&field.to_lowercase())
            .map_or("", String::as_str)
    }

    /// Whether a field was captured.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(&field.to_lowercase())
    }

    #[must_use]
    pub fn platform(&self) -> &str {
        self.get(PLATFORM)
    }

    #[must_use]
    pub fn service(&self) -> &str {
        self.get(SERVICE)
    }

    #[must_use]
    pub fn status(&self) -> &str {
        self.get(STATUS)
    }

    #[must_use]
    pub fn description(&self) -> &str {
        self.get(DESCRIPTION)
    }

    #[must_use]
    pub fn facet(&self) -> &str {
        self.get(FACET)
    }

    /// Location, or the empty string if the alert has none.
    #[must_use]
    pub fn location(&self) -> &str {
        self.get(LOCATION)
    }

    /// Number of captured fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over captured fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Lower-case every key. When two keys differ only by case the first one in
/// key order is kept.
fn normalize(pairs: &KeyValues) -> BTreeMap<String, String> {
    let mut normalized = BTreeMap::new();
    for (key, value) in pairs {
        normalized
            .entry(key.to_lowercase())
            .or_insert_with(|| value.clone());
    }
    normalized
}

/// Extract the required fields, the optional location, and every
/// non-colliding annotation from an alert.
pub fn extract_values(alert: &Alert) -> Result<ExtractedValues, ExtractError> {
    let labels = normalize(&alert.labels);
    let mut values = BTreeMap::new();

    for field in REQUIRED_FIELDS {
        match labels.get(field) {
            None => return Err(ExtractError::MissingField(field.to_string())),
            Some(value) if value.is_empty() => {
                return Err(ExtractError::EmptyField(field.to_string()));
            }
            Some(value) => {
                values.insert(field.to_string(), value.clone());
            }
        }
    }

    if let Some(location) = labels.get(LOCATION).filter(|l| !l.is_empty()) {
        values.insert(LOCATION.to_string(), location.clone());
    }

    let from_labels: BTreeSet<String> = values.keys().cloned().collect();
    for (name, value) in &alert.annotations {
        let key = name.to_lowercase();
        if values.contains_key(&key) {
            let captured_from = if from_labels.contains(&key) {
                "a label"
            } else {
                "another annotation"
            };
            warn!(
                fingerprint = %alert.fingerprint,
                annotation = %name,
                captured_from,
                "skipping annotation, key '{key}' was already captured from {captured_from}"
            );
            continue;
        }
        values.insert(key, value.clone());
    }

    Ok(ExtractedValues { values })
}
