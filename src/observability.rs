use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings that won the race and committed.
pub const BOOKINGS_CONFIRMED_TOTAL: &str = "rota_bookings_confirmed_total";

/// Counter: bookings that lost the race (slot no longer available).
/// An expected outcome under contention, not an error.
pub const BOOKINGS_LOST_TOTAL: &str = "rota_bookings_lost_total";

/// Counter: slots created.
pub const SLOTS_CREATED_TOTAL: &str = "rota_slots_created_total";

/// Counter: create/update calls rejected because the interval overlapped
/// a sibling slot.
pub const SLOT_OVERLAP_REJECTED_TOTAL: &str = "rota_slot_overlap_rejected_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "rota_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "rota_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Install the fmt tracing subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}
