//! Prometheus metrics for sheet reads and token refreshes.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

// === Metric Name Constants ===

/// Sheet fetch latency metric name.
pub const METRIC_SHEET_FETCH_LATENCY: &str = "sheet_fetch_latency_ms";
/// Sheet fetches counter metric name.
pub const METRIC_SHEET_FETCH_TOTAL: &str = "sheet_fetch_total";
/// Token refreshes counter metric name.
pub const METRIC_TOKEN_REFRESH_TOTAL: &str = "token_refresh_total";
/// API requests counter metric name.
pub const METRIC_API_REQUESTS_TOTAL: &str = "api_requests_total";

static PROMETHEUS: OnceCell<Option<PrometheusHandle>> = OnceCell::new();

/// Install the Prometheus recorder and register metric descriptions.
///
/// Safe to call more than once; later calls return the first handle.
/// Returns `None` when another recorder is already installed.
pub fn init_metrics() -> Option<PrometheusHandle> {
    PROMETHEUS
        .get_or_init(|| {
            let handle = match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => handle,
                Err(e) => {
                    warn!("Metrics recorder not installed: {}", e);
                    return None;
                }
            };

            describe_histogram!(
                METRIC_SHEET_FETCH_LATENCY,
                "Sheets API read latency in milliseconds"
            );
            describe_counter!(
                METRIC_SHEET_FETCH_TOTAL,
                "Total number of sheet reads by outcome"
            );
            describe_counter!(
                METRIC_TOKEN_REFRESH_TOTAL,
                "Total number of access token requests by outcome"
            );
            describe_counter!(
                METRIC_API_REQUESTS_TOTAL,
                "Total number of data endpoint requests by status"
            );

            debug!("Metrics initialized");
            Some(handle)
        })
        .clone()
}

/// Record a sheet read and its latency.
pub fn record_sheet_fetch(start: Instant, outcome: &'static str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_SHEET_FETCH_LATENCY).record(latency_ms);
    counter!(METRIC_SHEET_FETCH_TOTAL, "outcome" => outcome).increment(1);
}

/// Increment the token refresh counter.
pub fn inc_token_refresh(outcome: &'static str) {
    counter!(METRIC_TOKEN_REFRESH_TOTAL, "outcome" => outcome).increment(1);
}

/// Increment the data endpoint request counter.
pub fn inc_api_request(status: u16) {
    counter!(METRIC_API_REQUESTS_TOTAL, "status" => status.to_string()).increment(1);
}
