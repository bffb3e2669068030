//! Request outcome observation and Prometheus exposition.

use prometheus::{IntCounter, Opts, Registry, TextEncoder};

/// Gets told about requests the receiver rejected as bad.
pub trait RequestObserver: Send + Sync {
    /// A request was answered with 400 Bad Request.
    fn bad_request(&self);
}

/// Prometheus-backed observer with its own registry.
#[derive(Clone)]
pub struct PrometheusObserver {
    registry: Registry,
    bad_requests: IntCounter,
}

impl PrometheusObserver {
    /// Create the observer and register its counters.
    ///
    /// # Errors
    /// Returns error if a metric cannot be registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let bad_requests = IntCounter::with_opts(Opts::new(
            "snow_bad_requests_total",
            "The total number of bad requests",
        ))?;
        registry.register(Box::new(bad_requests.clone()))?;

        Ok(Self {
            registry,
            bad_requests,
        })
    }

    /// Current bad request count.
    #[must_use]
    pub fn bad_requests(&self) -> u64 {
        self.bad_requests.get()
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

impl RequestObserver for PrometheusObserver {
    fn bad_request(&self) {
        self.bad_requests.inc();
    }
}
