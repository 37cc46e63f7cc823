//! Prometheus metrics registry for the circulation service.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it to
//! the overdue scanner, the testing-mode watcher and the HTTP layer.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use prometheus::{Counter, Gauge, Opts, Registry};

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Total number of overdue scan passes.
    pub scans_total: Counter,
    /// Overdue notifications delivered (at most one per loan).
    pub overdue_notifications_total: Counter,
    /// Failed notification attempts, overdue and testing-mode alike.
    pub notification_failures_total: Counter,
    /// Testing-mode loans evicted after their window ran out.
    pub testing_loans_expired_total: Counter,
    /// Active loans seen by the most recent scan.
    pub active_loans: Gauge,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated (should not happen in practice).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let scans_total = Counter::with_opts(Opts::new(
            "library_scans_total",
            "Total overdue scan passes",
        ))?;

        let overdue_notifications_total = Counter::with_opts(Opts::new(
            "library_overdue_notifications_total",
            "Overdue notifications delivered",
        ))?;

        let notification_failures_total = Counter::with_opts(Opts::new(
            "library_notification_failures_total",
            "Notification attempts that failed in transport",
        ))?;

        let testing_loans_expired_total = Counter::with_opts(Opts::new(
            "library_testing_loans_expired_total",
            "Testing-mode loans evicted on expiry",
        ))?;

        let active_loans = Gauge::with_opts(Opts::new(
            "library_active_loans",
            "Active loans seen by the latest scan",
        ))?;

        registry.register(Box::new(scans_total.clone()))?;
        registry.register(Box::new(overdue_notifications_total.clone()))?;
        registry.register(Box::new(notification_failures_total.clone()))?;
        registry.register(Box::new(testing_loans_expired_total.clone()))?;
        registry.register(Box::new(active_loans.clone()))?;

        Ok(Self {
            scans_total,
            overdue_notifications_total,
            notification_failures_total,
            testing_loans_expired_total,
            active_loans,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
