/// Runtime lifecycle event logging
///
/// Structured events for the load/execute/session lifecycle, with
/// correlation identifiers so one run can be traced from the session that
/// requested it through the environment that serviced it. Events are
/// rendered as JSON and routed through the `log` facade at a level derived
/// from their severity; the host owns the logger.
use crate::config::types::OutputIntegrity;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Event severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum EventSeverity {
    High,
    Medium,
    Low,
}

/// Types of runtime lifecycle events we track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RuntimeEventType {
    // Bootstrap events
    BootstrapStarted,
    BootstrapAttached,
    BootstrapSucceeded,
    BootstrapFailed,

    // Execution events
    ExecutionStarted,
    ExecutionFinished,
    DeadlineExpired,

    // Environment lifecycle
    EnvironmentRetired,

    // Session events
    RunStarted,
    RunFinished,
    RunRejected,
    SessionReset,
}

impl RuntimeEventType {
    /// Get the default severity for this event type
    pub fn default_severity(&self) -> EventSeverity {
        match self {
            RuntimeEventType::BootstrapStarted => EventSeverity::Low,
            RuntimeEventType::BootstrapAttached => EventSeverity::Low,
            RuntimeEventType::BootstrapSucceeded => EventSeverity::Low,
            RuntimeEventType::BootstrapFailed => EventSeverity::High,

            RuntimeEventType::ExecutionStarted => EventSeverity::Low,
            RuntimeEventType::ExecutionFinished => EventSeverity::Low,
            RuntimeEventType::DeadlineExpired => EventSeverity::High,

            RuntimeEventType::EnvironmentRetired => EventSeverity::Medium,

            RuntimeEventType::RunStarted => EventSeverity::Low,
            RuntimeEventType::RunFinished => EventSeverity::Low,
            RuntimeEventType::RunRejected => EventSeverity::Low,
            RuntimeEventType::SessionReset => EventSeverity::Low,
        }
    }
}

/// Correlation identifiers for event tracking
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationIds {
    /// Session that requested the work, if any
    pub session_id: Option<String>,
    /// Specific run attempt, if any
    pub run_id: Option<String>,
    /// Environment envelope serving the work, if any
    pub envelope_id: Option<String>,
    /// Environment generation (bootstrap counter), if any
    pub generation: Option<u64>,
}

impl CorrelationIds {
    pub fn for_envelope(envelope_id: &str, generation: u64) -> Self {
        CorrelationIds {
            envelope_id: Some(envelope_id.to_string()),
            generation: Some(generation),
            ..CorrelationIds::default()
        }
    }

    pub fn for_session(session_id: &str) -> Self {
        CorrelationIds {
            session_id: Some(session_id.to_string()),
            ..CorrelationIds::default()
        }
    }

    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }
}

/// Individual runtime lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEvent {
    pub event_type: RuntimeEventType,
    pub severity: EventSeverity,
    pub timestamp: SystemTime,
    pub correlation: CorrelationIds,
    pub details: String,
}

impl RuntimeEvent {
    /// Create a new event with default severity
    pub fn new(event_type: RuntimeEventType, correlation: CorrelationIds, details: String) -> Self {
        let severity = event_type.default_severity();
        Self {
            event_type,
            severity,
            timestamp: SystemTime::now(),
            correlation,
            details,
        }
    }

    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// Render and emit one event at the level its severity calls for.
pub fn log_runtime_event(event: RuntimeEvent) {
    let rendered = serde_json::to_string(&event)
        .unwrap_or_else(|e| format!("{{\"unserializable_event\":\"{}\"}}", e));

    match event.severity {
        EventSeverity::High => error!("RUNTIME: {}", rendered),
        EventSeverity::Medium => warn!("RUNTIME: {}", rendered),
        EventSeverity::Low => info!("RUNTIME: {}", rendered),
    }
}

/// Convenience functions for common lifecycle events
pub mod events {
    use super::*;

    pub fn bootstrap_started(envelope_id: &str, generation: u64) {
        log_runtime_event(RuntimeEvent::new(
            RuntimeEventType::BootstrapStarted,
            CorrelationIds::for_envelope(envelope_id, generation),
            format!("Bootstrapping environment {}", envelope_id),
        ));
    }

    /// A caller arrived during `Loading` and attached to the in-flight
    /// bootstrap instead of starting a second one.
    pub fn bootstrap_attached(envelope_id: &str) {
        log_runtime_event(RuntimeEvent::new(
            RuntimeEventType::BootstrapAttached,
            CorrelationIds {
                envelope_id: Some(envelope_id.to_string()),
                ..CorrelationIds::default()
            },
            format!("Attached to in-flight bootstrap of {}", envelope_id),
        ));
    }

    pub fn bootstrap_succeeded(envelope_id: &str, generation: u64, startup_ms: u64) {
        log_runtime_event(RuntimeEvent::new(
            RuntimeEventType::BootstrapSucceeded,
            CorrelationIds::for_envelope(envelope_id, generation),
            format!("Environment {} ready in {} ms", envelope_id, startup_ms),
        ));
    }

    pub fn bootstrap_failed(envelope_id: &str, generation: u64, error: &str) {
        log_runtime_event(RuntimeEvent::new(
            RuntimeEventType::BootstrapFailed,
            CorrelationIds::for_envelope(envelope_id, generation),
            format!("Environment {} failed to bootstrap: {}", envelope_id, error),
        ));
    }

    pub fn environment_retired(envelope_id: &str, generation: u64) {
        log_runtime_event(RuntimeEvent::new(
            RuntimeEventType::EnvironmentRetired,
            CorrelationIds::for_envelope(envelope_id, generation),
            format!(
                "Environment {} generation {} retired; session globals lost",
                envelope_id, generation
            ),
        ));
    }

    pub fn execution_started(envelope_id: &str, generation: u64) {
        log_runtime_event(RuntimeEvent::new(
            RuntimeEventType::ExecutionStarted,
            CorrelationIds::for_envelope(envelope_id, generation),
            format!("Execution started on {}", envelope_id),
        ));
    }

    pub fn execution_finished(
        envelope_id: &str,
        generation: u64,
        status: &str,
        wall_time_ms: u64,
        integrity: OutputIntegrity,
    ) {
        log_runtime_event(RuntimeEvent::new(
            RuntimeEventType::ExecutionFinished,
            CorrelationIds::for_envelope(envelope_id, generation),
            format!(
                "Execution finished: status={} wall_time_ms={} output={}",
                status, wall_time_ms, integrity
            ),
        ));
    }

    pub fn deadline_expired(envelope_id: &str, generation: u64, limit_ms: u64) {
        log_runtime_event(RuntimeEvent::new(
            RuntimeEventType::DeadlineExpired,
            CorrelationIds::for_envelope(envelope_id, generation),
            format!("Execution exceeded wall limit of {} ms", limit_ms),
        ));
    }

    pub fn run_started(session_id: &str, run_id: &str) {
        log_runtime_event(RuntimeEvent::new(
            RuntimeEventType::RunStarted,
            CorrelationIds::for_session(session_id).with_run_id(run_id),
            "Session run started".to_string(),
        ));
    }

    pub fn run_finished(session_id: &str, run_id: &str, status: &str) {
        log_runtime_event(RuntimeEvent::new(
            RuntimeEventType::RunFinished,
            CorrelationIds::for_session(session_id).with_run_id(run_id),
            format!("Session run finished: {}", status),
        ));
    }

    /// A run request arrived while the session was already `Running`.
    pub fn run_rejected(session_id: &str) {
        log_runtime_event(RuntimeEvent::new(
            RuntimeEventType::RunRejected,
            CorrelationIds::for_session(session_id),
            "Run request ignored: session already running".to_string(),
        ));
    }

    pub fn session_reset(session_id: &str) {
        log_runtime_event(RuntimeEvent::new(
            RuntimeEventType::SessionReset,
            CorrelationIds::for_session(session_id),
            "Session reset to initial code".to_string(),
        ));
    }
}
