//! Ambient Prometheus metrics, feature-gated exactly like the teacher's
//! `metrics/mod.rs`: no-op when the `prometheus` feature is disabled.

#[cfg(feature = "prometheus")]
pub fn init() -> anyhow::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    PrometheusBuilder::new()
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install prometheus recorder: {e}"))?;
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
pub fn init() -> anyhow::Result<()> {
    Ok(())
}

#[cfg(feature = "prometheus")]
pub fn record_authorization_request() {
    metrics::counter!("oidcd_authorization_requests_total").increment(1);
}

#[cfg(not(feature = "prometheus"))]
pub fn record_authorization_request() {}

#[cfg(feature = "prometheus")]
pub fn record_token_issued(kind: &str) {
    metrics::counter!("oidcd_tokens_issued_total", "kind" => kind.to_string()).increment(1);
}

#[cfg(not(feature = "prometheus"))]
pub fn record_token_issued(_kind: &str) {}

#[cfg(feature = "prometheus")]
pub fn record_introspection_request() {
    metrics::counter!("oidcd_introspection_requests_total").increment(1);
}

#[cfg(not(feature = "prometheus"))]
pub fn record_introspection_request() {}

#[cfg(feature = "prometheus")]
pub fn record_cache_hit() {
    metrics::counter!("oidcd_cache_hits_total").increment(1);
}

#[cfg(not(feature = "prometheus"))]
pub fn record_cache_hit() {}

#[cfg(feature = "prometheus")]
pub fn record_cache_miss() {
    metrics::counter!("oidcd_cache_misses_total").increment(1);
}

#[cfg(not(feature = "prometheus"))]
pub fn record_cache_miss() {}
