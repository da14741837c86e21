//! State-layer metrics
//!
//! Recompute activity of the static-route synthesizer. Per-store counters
//! live on the stores themselves (see [`StoreMetrics`](crate::store::StoreMetrics)).

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    /// State-layer metrics registry
    pub static ref STATE_METRICS_REGISTRY: Registry = Registry::new();

    /// Static-route recompute duration
    static ref STATIC_ROUTE_RECOMPUTE_DURATION: HistogramVec = {
        let opts = HistogramOpts::new(
            "static_route_recompute_duration_seconds",
            "Static route recompute duration in seconds",
        );
        let histogram = HistogramVec::new(opts, &["vrf"])
            .expect("Failed to create histogram");
        STATE_METRICS_REGISTRY
            .register(Box::new(histogram.clone()))
            .expect("Failed to register histogram");
        histogram
    };

    /// Static-route recomputes total
    static ref STATIC_ROUTE_RECOMPUTES_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "static_route_recomputes_total",
            "Total number of static route recomputes",
        );
        let counter = IntCounterVec::new(opts, &["vrf", "result"])
            .expect("Failed to create counter");
        STATE_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Static routes currently published
    static ref STATIC_ROUTES: IntGaugeVec = {
        let opts = Opts::new("static_routes", "Static routes published on a VRF node");
        let gauge = IntGaugeVec::new(opts, &["vrf"]).expect("Failed to create gauge");
        STATE_METRICS_REGISTRY
            .register(Box::new(gauge.clone()))
            .expect("Failed to register gauge");
        gauge
    };

    /// CIDR blocks skipped during recompute
    static ref SKIPPED_CIDR_BLOCKS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "skipped_cidr_blocks_total",
            "Total number of pod CIDR blocks skipped as malformed",
        );
        let counter = IntCounterVec::new(opts, &["reason"])
            .expect("Failed to create counter");
        STATE_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };
}

/// Record one recompute of a VRF node's static routes
///
/// `result` is `changed` or `unchanged`.
pub fn record_static_route_recompute(vrf: &str, duration_secs: f64, route_count: usize, result: &str) {
    STATIC_ROUTE_RECOMPUTE_DURATION
        .with_label_values(&[vrf])
        .observe(duration_secs);

    STATIC_ROUTE_RECOMPUTES_TOTAL
        .with_label_values(&[vrf, result])
        .inc();

    STATIC_ROUTES
        .with_label_values(&[vrf])
        .set(i64::try_from(route_count).unwrap_or(i64::MAX));
}

/// Record a CIDR block dropped for `reason`
pub fn record_skipped_block(reason: &str) {
    SKIPPED_CIDR_BLOCKS_TOTAL.with_label_values(&[reason]).inc();
}

/// Gather state-layer metrics
pub fn gather_state_metrics() -> Result<String, String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = STATE_METRICS_REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert to UTF-8: {}", e))
}
