use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: outcome (confirmed, conflict, rejected, error).
pub const BOOKINGS_TOTAL: &str = "chairtime_bookings_total";

/// Histogram: booking transaction latency in seconds.
pub const BOOKING_DURATION_SECONDS: &str = "chairtime_booking_duration_seconds";

/// Counter: slot-grid queries served.
pub const SLOT_QUERIES_TOTAL: &str = "chairtime_slot_queries_total";

/// Counter: appointments moved to CANCELLED.
pub const CANCELLATIONS_TOTAL: &str = "chairtime_cancellations_total";

/// Counter: waitlist entries auto-promoted into a freed slot.
pub const PROMOTIONS_TOTAL: &str = "chairtime_promotions_total";

/// Counter: waitlist entries notified after a cancellation (notify policy).
pub const WAITLIST_NOTIFICATIONS_TOTAL: &str = "chairtime_waitlist_notifications_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: outbound notifications attempted.
pub const NOTIFICATIONS_TOTAL: &str = "chairtime_notifications_total";

/// Counter: outbound notifications that failed (best-effort, never fatal).
pub const NOTIFICATION_FAILURES_TOTAL: &str = "chairtime_notification_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "chairtime_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "chairtime_wal_flush_batch_size";

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
