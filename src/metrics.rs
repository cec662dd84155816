//! Prometheus metrics collection for ircbnc.
//!
//! - `bnc_command_total{verb}` - BOUNCER commands processed by verb
//! - `bnc_command_duration_seconds{verb}` - Command latency histogram
//! - `bnc_command_errors_total{verb,status}` - Rejected commands by status token
//! - `bnc_connected_clients` - Open client connections (gauge)
//! - `bnc_upstream_connected` - Upstream links in the connected state (gauge)
//! - `bnc_buffers_created_total` - Buffers created from upstream traffic
//! - `bnc_query_buffers_dropped_total` - Private messages that hit the query buffer limit

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// BOUNCER commands processed, by verb.
pub static COMMAND_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// BOUNCER command latency, by verb.
pub static COMMAND_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// BOUNCER commands rejected, by verb and status token.
pub static COMMAND_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Currently open client connections.
pub static CONNECTED_CLIENTS: OnceLock<IntGauge> = OnceLock::new();

/// Upstream links currently connected.
pub static UPSTREAM_CONNECTED: OnceLock<IntGauge> = OnceLock::new();

/// Buffers created from upstream traffic.
pub static BUFFERS_CREATED: OnceLock<IntCounter> = OnceLock::new();

/// Query buffers not created because the per-network limit was reached.
pub static QUERY_BUFFERS_DROPPED: OnceLock<IntCounter> = OnceLock::new();

/// Initialize all metrics and register them with the global registry.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(COMMAND_COUNTER, IntCounterVec::new(Opts::new("bnc_command_total", "BOUNCER commands processed by verb"), &["verb"]));
    register!(COMMAND_LATENCY, HistogramVec::new(
        HistogramOpts::new("bnc_command_duration_seconds", "BOUNCER command latency by verb")
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        &["verb"]));
    register!(COMMAND_ERRORS, IntCounterVec::new(Opts::new("bnc_command_errors_total", "BOUNCER commands rejected by status"), &["verb", "status"]));
    register!(CONNECTED_CLIENTS, IntGauge::new("bnc_connected_clients", "Currently open client connections"));
    register!(UPSTREAM_CONNECTED, IntGauge::new("bnc_upstream_connected", "Upstream links in the connected state"));
    register!(BUFFERS_CREATED, IntCounter::new("bnc_buffers_created_total", "Buffers created from upstream traffic"));
    register!(QUERY_BUFFERS_DROPPED, IntCounter::new("bnc_query_buffers_dropped_total", "Private messages that hit the query buffer limit"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record a command execution with latency.
#[inline]
pub fn record_command(verb: &str, duration_secs: f64) {
    if let Some(c) = COMMAND_COUNTER.get() {
        c.with_label_values(&[verb]).inc();
    }
    if let Some(h) = COMMAND_LATENCY.get() {
        h.with_label_values(&[verb]).observe(duration_secs);
    }
}

/// Record a rejected command.
#[inline]
pub fn record_command_error(verb: &str, status: &str) {
    if let Some(c) = COMMAND_ERRORS.get() {
        c.with_label_values(&[verb, status]).inc();
    }
}

#[inline]
pub fn client_connected() {
    if let Some(g) = CONNECTED_CLIENTS.get() {
        g.inc();
    }
}

#[inline]
pub fn client_disconnected() {
    if let Some(g) = CONNECTED_CLIENTS.get() {
        g.dec();
    }
}

#[inline]
pub fn upstream_up() {
    if let Some(g) = UPSTREAM_CONNECTED.get() {
        g.inc();
    }
}

#[inline]
pub fn upstream_down() {
    if let Some(g) = UPSTREAM_CONNECTED.get() {
        g.dec();
    }
}

#[inline]
pub fn buffer_created() {
    if let Some(c) = BUFFERS_CREATED.get() {
        c.inc();
    }
}

#[inline]
pub fn query_buffer_dropped() {
    if let Some(c) = QUERY_BUFFERS_DROPPED.get() {
        c.inc();
    }
}
