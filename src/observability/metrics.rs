//! Thread-safe metrics collection system
//!
//! Atomic counters for request traffic and task progress, plus the name of
//! the state the agent is currently in.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::protocol::{RequestType, StatusCode};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and a mutex for the state name
#[derive(Debug)]
pub struct MetricsCollector {
    requests_sent: AtomicU64,
    request_failures: AtomicU64,
    requests_rejected: AtomicU64,
    position_updates: AtomicU64,
    status_updates: AtomicU64,
    no_task_polls: AtomicU64,
    tasks_started: AtomicU64,
    tasks_completed: AtomicU64,
    state_transitions: AtomicU64,
    agent_state: Mutex<String>,
}

/// Point-in-time copy of every metric
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub captured_at: DateTime<Utc>,
    pub requests_sent: u64,
    pub request_failures: u64,
    pub requests_rejected: u64,
    pub position_updates: u64,
    pub status_updates: u64,
    pub no_task_polls: u64,
    pub tasks_started: u64,
    pub tasks_completed: u64,
    pub state_transitions: u64,
    pub agent_state: String,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            requests_sent: AtomicU64::new(0),
            request_failures: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            position_updates: AtomicU64::new(0),
            status_updates: AtomicU64::new(0),
            no_task_polls: AtomicU64::new(0),
            tasks_started: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            state_transitions: AtomicU64::new(0),
            agent_state: Mutex::new("unregistered".to_string()),
        }
    }

    /// Record a request that got a well-formed response
    ///
    /// Per-type counters only move when the server accepted the request.
    pub fn response_received(&self, request_type: RequestType, status: StatusCode) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        if !status.is_success() {
            return;
        }
        match request_type {
            RequestType::PositionUpdate => {
                self.position_updates.fetch_add(1, Ordering::Relaxed);
            }
            RequestType::StatusUpdate => {
                self.status_updates.fetch_add(1, Ordering::Relaxed);
            }
            RequestType::TaskComplete => {
                self.tasks_completed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// Record a request lost to a transport or decode failure
    pub fn request_failed(&self) {
        self.request_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a response carrying a non-success status
    pub fn request_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn no_task_poll(&self) {
        self.no_task_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_started(&self) {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_agent_state(&self, state: &str) {
        if let Ok(mut current) = self.agent_state.lock() {
            if *current != state {
                *current = state.to_string();
                self.state_transitions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn agent_state(&self) -> String {
        self.agent_state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            captured_at: Utc::now(),
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            request_failures: self.request_failures.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            position_updates: self.position_updates.load(Ordering::Relaxed),
            status_updates: self.status_updates.load(Ordering::Relaxed),
            no_task_polls: self.no_task_polls.load(Ordering::Relaxed),
            tasks_started: self.tasks_started.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
            agent_state: self.agent_state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_counters_by_type() {
        let collector = MetricsCollector::new();
        collector.response_received(RequestType::PositionUpdate, StatusCode::Success);
        collector.response_received(RequestType::PositionUpdate, StatusCode::Success);
        collector.response_received(RequestType::StatusUpdate, StatusCode::Success);
        collector.response_received(RequestType::TaskComplete, StatusCode::Success);
        collector.response_received(RequestType::RequestForTask, StatusCode::FailureNoTasks);
        collector.request_failed();
        collector.request_rejected();
        collector.no_task_poll();
        collector.task_started();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.requests_sent, 5);
        assert_eq!(snapshot.position_updates, 2);
        assert_eq!(snapshot.status_updates, 1);
        assert_eq!(snapshot.tasks_completed, 1);
        assert_eq!(snapshot.request_failures, 1);
        assert_eq!(snapshot.requests_rejected, 1);
        assert_eq!(snapshot.no_task_polls, 1);
        assert_eq!(snapshot.tasks_started, 1);
    }

    #[test]
    fn test_rejected_requests_skip_type_counters() {
        let collector = MetricsCollector::new();
        collector.response_received(RequestType::TaskComplete, StatusCode::FailureOther);
        collector.response_received(RequestType::PositionUpdate, StatusCode::FailureAgentTooFar);
        collector.response_received(RequestType::StatusUpdate, StatusCode::FailureRequestParsingError);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.requests_sent, 3);
        assert_eq!(snapshot.tasks_completed, 0);
        assert_eq!(snapshot.position_updates, 0);
        assert_eq!(snapshot.status_updates, 0);
    }

    #[test]
    fn test_state_transitions_count_changes_only() {
        let collector = MetricsCollector::new();
        assert_eq!(collector.agent_state(), "unregistered");

        collector.set_agent_state("registering");
        collector.set_agent_state("registering");
        collector.set_agent_state("idle");

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.agent_state, "idle");
        assert_eq!(snapshot.state_transitions, 2);
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let snapshot = MetricsCollector::new().snapshot();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["requests_sent"], 0);
        assert_eq!(json["agent_state"], "unregistered");
        assert!(json["captured_at"].is_string());
    }
}
