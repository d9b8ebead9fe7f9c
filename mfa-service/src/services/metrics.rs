use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

struct Metrics {
    registry: Registry,
    http_requests: IntCounterVec,
    provider_requests: IntCounterVec,
    nonce_rejections: IntCounter,
    idempotent_replays: IntCounter,
}

// Registry and collectors are published together so they never disagree.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Create and register all collectors. Later calls are no-ops.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let http_requests = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )?;
    let provider_requests = IntCounterVec::new(
        Opts::new(
            "mfa_provider_requests_total",
            "Requests sent to the MFA provider",
        ),
        &["endpoint", "outcome"],
    )?;
    let nonce_rejections = IntCounter::new(
        "mfa_nonce_rejections_total",
        "Approvals rejected because the nonce was already used",
    )?;
    let idempotent_replays = IntCounter::new(
        "mfa_idempotent_replays_total",
        "Responses replayed from the idempotency cache",
    )?;

    registry.register(Box::new(http_requests.clone()))?;
    registry.register(Box::new(provider_requests.clone()))?;
    registry.register(Box::new(nonce_rejections.clone()))?;
    registry.register(Box::new(idempotent_replays.clone()))?;

    let _ = METRICS.set(Metrics {
        registry,
        http_requests,
        provider_requests,
        nonce_rejections,
        idempotent_replays,
    });

    Ok(())
}

pub fn record_http_request(method: &str, path: &str, status: u16) {
    if let Some(m) = METRICS.get() {
        m.http_requests
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
    }
}

pub fn record_provider_request(endpoint: &str, outcome: &str) {
    if let Some(m) = METRICS.get() {
        m.provider_requests
            .with_label_values(&[endpoint, outcome])
            .inc();
    }
}

pub fn record_nonce_rejection() {
    if let Some(m) = METRICS.get() {
        m.nonce_rejections.inc();
    }
}

pub fn record_idempotent_replay() {
    if let Some(m) = METRICS.get() {
        m.idempotent_replays.inc();
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match METRICS.get() {
        Some(m) => &m.registry,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}
