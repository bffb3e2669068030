//! Orders a batch of alerts by start time.

use crate::alert::Alert;

/// Sort alerts ascending by `starts_at`. Alerts that started at the same
/// instant keep their original relative order.
#[must_use]
pub fn order_by_start(mut alerts: Vec<Alert>) -> Vec<Alert> {
    alerts.sort_by_key(|alert| alert.starts_at);
    alerts
}
