use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::command::Command;
use crate::engine::{Outcome, ScheduleError};

// ── RED metrics (operation-driven) ──────────────────────────────

/// Counter: scheduling operations executed. Labels: operation, outcome.
pub const OPERATIONS_TOTAL: &str = "roomslot_operations_total";

/// Histogram: operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "roomslot_operation_duration_seconds";

// ── Exclusion & search ──────────────────────────────────────────

/// Counter: exclusion source reads that failed. Labels: source.
pub const FETCH_FAILURES_TOTAL: &str = "roomslot_exclusion_fetch_failures_total";

/// Histogram: rooms conflict-checked per suggestion search.
pub const SUGGEST_CANDIDATES_CHECKED: &str = "roomslot_suggest_candidates_checked";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

pub fn record(operation: &'static str, started: Instant, outcome: &'static str) {
    metrics::counter!(OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}

/// Map a Command variant to a short label for logs.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Accept { .. } => "accept",
        Command::Suggest { .. } => "suggest",
        Command::Move { .. } => "move",
        Command::Request { .. } => "request",
        Command::Revise { .. } => "revise",
        Command::Blackout { .. } => "blackout",
        Command::Search { .. } => "search",
    }
}

/// Map an Outcome variant to a short label for metrics.
pub fn outcome_label(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Assigned { .. } => "assigned",
        Outcome::ConflictDetected { .. } => "conflict",
        Outcome::NoRoomAvailable => "no_room",
        Outcome::InvalidInterval => "invalid_interval",
        Outcome::NotFound { .. } => "not_found",
        Outcome::AlreadyAssigned { .. } => "already_assigned",
        Outcome::NotPending { .. } => "not_pending",
        Outcome::SourceUnavailable { .. } => "source_unavailable",
        Outcome::StoreFailure { .. } => "store_failure",
    }
}

pub fn result_label<T>(result: &Result<T, ScheduleError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(ScheduleError::NotFound { .. }) => "not_found",
        Err(ScheduleError::InvalidInterval) => "invalid_interval",
        Err(ScheduleError::AlreadyAssigned(_)) => "already_assigned",
        Err(ScheduleError::NotPending { .. }) => "not_pending",
        Err(ScheduleError::Store(_)) => "store_failure",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Entity;

    #[test]
    fn labels_are_stable() {
        assert_eq!(outcome_label(&Outcome::NoRoomAvailable), "no_room");
        assert_eq!(
            outcome_label(&Outcome::NotFound { entity: Entity::Room, id: 1 }),
            "not_found"
        );
        assert_eq!(result_label::<()>(&Ok(())), "ok");
        assert_eq!(result_label::<()>(&Err(ScheduleError::InvalidInterval)), "invalid_interval");
    }

    #[test]
    fn init_without_port_is_noop() {
        assert!(init(None).is_ok());
    }
}
