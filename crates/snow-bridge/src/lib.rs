//! Alertmanager to ServiceNow bridge.
//!
//! This crate provides:
//! - Alertmanager webhook payload types
//! - Field extraction and natural key derivation for each alert
//! - A ServiceNow incident client behind the [`IncidentPublisher`] trait
//! - Fail-fast batch processing, oldest alert first
//! - An axum router with Basic auth, probes and optional Prometheus metrics
//!
//! # Configuration
//!
//! See [`config::Config`]. Values are read from `config.toml` and
//! `SNOW_*` environment variables.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod alert;
pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod incident;
pub mod key;
pub mod metrics;
pub mod processor;
pub mod sequence;
pub mod server;

pub use alert::{Alert, AlertBatch};
pub use config::Config;
pub use error::{ExtractError, IncidentError, ProcessingError};
pub use extract::{extract_values, ExtractedValues};
pub use incident::{IncidentPublisher, IncidentRequest, ServiceNowClient};
pub use key::derive_key;
pub use metrics::{PrometheusObserver, RequestObserver};
pub use processor::AlertProcessor;
pub use server::{build_router, AppState, Readiness};
