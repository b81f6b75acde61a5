//! Connector metrics recorded through the `metrics` facade.
//!
//! Nothing is exported unless the host process installs a recorder (the
//! services install the Prometheus exporter at startup).

/// Record the outcome of one primary connection attempt.
///
/// Increments `bustrack_db_connect_attempts_total`.
///
/// # Arguments
///
/// * `outcome` - "success", "transient" or "fatal"
pub fn record_db_connect_attempt(outcome: &str) {
    metrics::counter!(
        "bustrack_db_connect_attempts_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a replica endpoint that was dropped because it failed to open or ping.
pub fn record_replica_excluded() {
    metrics::counter!("bustrack_db_replicas_excluded_total").increment(1);
}

/// Record a delivered event and how many writes it took.
///
/// Increments `bustrack_events_published_total` and records to the
/// `bustrack_events_publish_attempts` histogram.
pub fn record_event_published(topic: &str, attempts: u32) {
    metrics::counter!(
        "bustrack_events_published_total",
        "topic" => topic.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "bustrack_events_publish_attempts",
        "topic" => topic.to_string()
    )
    .record(f64::from(attempts));
}

/// Record an event that was not delivered.
///
/// A database write followed by a failed publish leaves the two stores out of
/// step; this counter is the signal for that gap.
///
/// # Arguments
///
/// * `topic` - Destination topic
/// * `reason` - "encoding", "exhausted" or "cancelled"
pub fn record_publish_failed(topic: &str, reason: &str) {
    metrics::counter!(
        "bustrack_events_publish_failed_total",
        "topic" => topic.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}
