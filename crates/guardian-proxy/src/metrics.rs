//! Thin wrappers around the `metrics` facade so call sites never need to
//! `#[cfg]` themselves; compiled to no-ops when the `metrics` feature is off.

#[cfg(feature = "metrics")]
pub fn connection_opened() {
    metrics::counter!("guardian_proxy_connections_total").increment(1);
    metrics::gauge!("guardian_proxy_connections_active").increment(1.0);
}

#[cfg(not(feature = "metrics"))]
pub fn connection_opened() {}

#[cfg(feature = "metrics")]
pub fn connection_closed() {
    metrics::gauge!("guardian_proxy_connections_active").decrement(1.0);
}

#[cfg(not(feature = "metrics"))]
pub fn connection_closed() {}

#[cfg(feature = "metrics")]
pub fn request_result(result: &'static str) {
    metrics::counter!("guardian_proxy_requests_total", "result" => result).increment(1);
}

#[cfg(not(feature = "metrics"))]
pub fn request_result(_result: &'static str) {}

#[cfg(feature = "metrics")]
pub fn upstream_error(kind: &'static str) {
    metrics::counter!("guardian_proxy_upstream_errors_total", "error" => kind).increment(1);
}

#[cfg(not(feature = "metrics"))]
pub fn upstream_error(_kind: &'static str) {}

#[cfg(feature = "metrics")]
pub fn bytes_transferred(direction: &'static str, n: u64) {
    metrics::counter!("guardian_proxy_bytes_transferred_total", "direction" => direction).increment(n);
}

#[cfg(not(feature = "metrics"))]
pub fn bytes_transferred(_direction: &'static str, _n: u64) {}

#[cfg(feature = "metrics")]
pub fn tunnel_duration(secs: f64) {
    metrics::histogram!("guardian_proxy_tunnel_duration_seconds").record(secs);
}

#[cfg(not(feature = "metrics"))]
pub fn tunnel_duration(_secs: f64) {}
