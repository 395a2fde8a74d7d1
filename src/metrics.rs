//! Prometheus metrics for the cell arena
//!
//! Features:
//! - Slot gauges (total, free, live)
//! - Fragment count and pending deferred reclaims
//! - Reported errors by kind
//!
//! Gauges carry an `arena` label holding [`Arena::id`](crate::arena::Arena::id),
//! so several arenas in one process publish separate series.

use crate::arena::ArenaStats;
use crate::error::ErrorKind;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Once;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    pub static ref SLOTS_TOTAL: IntGaugeVec = IntGaugeVec::new(
        Opts::new("slip_slots_total", "Cell slots obtained from the system allocator"),
        &["arena"]
    ).unwrap();

    pub static ref SLOTS_FREE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("slip_slots_free", "Cell slots on the available space list"),
        &["arena"]
    ).unwrap();

    pub static ref SLOTS_LIVE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("slip_slots_live", "Cell slots handed out and not yet released"),
        &["arena"]
    ).unwrap();

    pub static ref FRAGMENTS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("slip_fragments", "Registered arena fragments after coalescing"),
        &["arena"]
    ).unwrap();

    pub static ref PENDING_RECLAIMS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("slip_pending_reclaims", "Freed sublist slots whose header decrement is still deferred"),
        &["arena"]
    ).unwrap();

    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("slip_errors_total", "Errors reported to the diagnostic sink"),
        &["kind"]
    ).unwrap();
}

static INIT: Once = Once::new();

/// Register all metrics with the global registry (idempotent)
pub fn init_metrics() {
    INIT.call_once(|| {
        info!("Initializing Prometheus metrics");

        METRICS_REGISTRY.register(Box::new(SLOTS_TOTAL.clone())).ok();
        METRICS_REGISTRY.register(Box::new(SLOTS_FREE.clone())).ok();
        METRICS_REGISTRY.register(Box::new(SLOTS_LIVE.clone())).ok();
        METRICS_REGISTRY.register(Box::new(FRAGMENTS.clone())).ok();
        METRICS_REGISTRY.register(Box::new(PENDING_RECLAIMS.clone())).ok();
        METRICS_REGISTRY.register(Box::new(ERRORS_TOTAL.clone())).ok();
    });
}

/// Publish an arena snapshot to the gauges
pub fn record_stats(arena: u64, stats: &ArenaStats) {
    let label = arena.to_string();
    let labels = [label.as_str()];
    SLOTS_TOTAL.with_label_values(&labels).set(stats.total_slots as i64);
    SLOTS_FREE.with_label_values(&labels).set(stats.free_slots as i64);
    SLOTS_LIVE.with_label_values(&labels).set(stats.live_slots as i64);
    FRAGMENTS.with_label_values(&labels).set(stats.fragments as i64);
    PENDING_RECLAIMS.with_label_values(&labels).set(stats.pending_reclaims as i64);
}

/// Count one reported error
pub fn record_error(kind: ErrorKind) {
    ERRORS_TOTAL.with_label_values(&[kind.as_str()]).inc();
}

/// Export all metrics in Prometheus text format
pub fn export_metrics() -> String {
    init_metrics();

    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|_| String::from("# Error converting metrics\n"))
}
