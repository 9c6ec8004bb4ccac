use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: admission decisions. Labels: outcome (admitted/waitlisted).
pub const ADMISSIONS_TOTAL: &str = "registrar_admissions_total";

/// Counter: registrations canceled.
pub const CANCELLATIONS_TOTAL: &str = "registrar_cancellations_total";

/// Counter: waitlist promotions (cancellation- and capacity-raise-triggered).
pub const PROMOTIONS_TOTAL: &str = "registrar_promotions_total";

/// Counter: reservation requests accepted as pending.
pub const BOOKING_REQUESTS_TOTAL: &str = "registrar_booking_requests_total";

/// Counter: reservation decisions. Labels: decision (approved/rejected/conflict).
pub const BOOKING_DECISIONS_TOTAL: &str = "registrar_booking_decisions_total";

/// Counter: pending reservations auto-rejected by the sweeper.
pub const SWEEPER_REJECTED_TOTAL: &str = "registrar_sweeper_rejected_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "registrar_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "registrar_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
