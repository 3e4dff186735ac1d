//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Active clients, rooms and WebSocket connections held by the hub
//! - Domain events published on the bus, by kind
//! - Bus subscribers detached for falling behind
//! - Inbound hub actions by action and outcome

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "chat_hub";

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Users with at least one live connection
pub static ACTIVE_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("active_clients", "Number of users with a live connection").namespace(NAMESPACE),
    )
    .expect("Failed to create ACTIVE_CLIENTS metric")
});

/// Rooms with at least one active member
pub static ACTIVE_ROOMS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("active_rooms", "Number of rooms with an active member").namespace(NAMESPACE),
    )
    .expect("Failed to create ACTIVE_ROOMS metric")
});

/// Open WebSocket connections
pub static WEBSOCKET_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new(
            "websocket_connections_active",
            "Number of active WebSocket connections",
        )
        .namespace(NAMESPACE),
    )
    .expect("Failed to create WEBSOCKET_CONNECTIONS_ACTIVE metric")
});

/// Events handed to the bus, by kind
pub static EVENTS_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("events_published_total", "Total number of published domain events")
            .namespace(NAMESPACE),
        &["kind"],
    )
    .expect("Failed to create EVENTS_PUBLISHED_TOTAL metric")
});

/// Subscriptions dropped because their buffer was full
pub static BUS_SUBSCRIBERS_DETACHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "bus_subscribers_detached_total",
            "Total number of slow bus subscribers detached",
        )
        .namespace(NAMESPACE),
    )
    .expect("Failed to create BUS_SUBSCRIBERS_DETACHED_TOTAL metric")
});

/// Inbound hub actions
pub static HUB_INBOUND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("hub_inbound_total", "Total number of inbound hub actions").namespace(NAMESPACE),
        &["action", "outcome"], // outcome: "ok", "error"
    )
    .expect("Failed to create HUB_INBOUND_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(ACTIVE_CLIENTS.clone()))
        .expect("Failed to register ACTIVE_CLIENTS");
    registry
        .register(Box::new(ACTIVE_ROOMS.clone()))
        .expect("Failed to register ACTIVE_ROOMS");
    registry
        .register(Box::new(WEBSOCKET_CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register WEBSOCKET_CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(EVENTS_PUBLISHED_TOTAL.clone()))
        .expect("Failed to register EVENTS_PUBLISHED_TOTAL");
    registry
        .register(Box::new(BUS_SUBSCRIBERS_DETACHED_TOTAL.clone()))
        .expect("Failed to register BUS_SUBSCRIBERS_DETACHED_TOTAL");
    registry
        .register(Box::new(HUB_INBOUND_TOTAL.clone()))
        .expect("Failed to register HUB_INBOUND_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Helper to record a published event
pub fn record_event_published(kind: &str) {
    EVENTS_PUBLISHED_TOTAL.with_label_values(&[kind]).inc();
}

/// Helper to record an inbound hub action
pub fn record_inbound(action: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    HUB_INBOUND_TOTAL.with_label_values(&[action, outcome]).inc();
}
