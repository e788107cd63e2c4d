/// Core types and structures for the codecell runtime
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of the process-wide runtime environment.
///
/// Transitions are monotonic except `Failed -> Loading` (retry) and the
/// retirement path, where a `Ready` environment torn down by the wall-time
/// deadline is observed as `Unloaded` again until the next bootstrap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeState {
    /// No bootstrap has been attempted (or the last environment was retired)
    Unloaded,
    /// A bootstrap is in flight; late callers attach to it
    Loading,
    /// The interpreter environment is cached and shared by all sessions
    Ready,
    /// The last bootstrap failed; a later call may retry
    Failed,
}

impl std::fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RuntimeState::Unloaded => "unloaded",
            RuntimeState::Loading => "loading",
            RuntimeState::Ready => "ready",
            RuntimeState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Terminal outcome of one execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalStatus {
    /// The submitted source ran to completion
    Success,
    /// The submitted source faulted; lines emitted before the fault are kept
    RuntimeError { message: String },
}

impl TerminalStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalStatus::Success)
    }

    /// Short status name for logs and audit records.
    pub fn name(&self) -> &'static str {
        match self {
            TerminalStatus::Success => "success",
            TerminalStatus::RuntimeError { .. } => "runtime_error",
        }
    }
}

/// Output integrity classification for one execution's captured lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputIntegrity {
    /// Every emitted line was captured
    Complete,
    /// Collection stopped at the line-count cap
    TruncatedByLineLimit,
    /// Collection stopped at the byte cap
    TruncatedByByteLimit,
}

impl std::fmt::Display for OutputIntegrity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutputIntegrity::Complete => "complete",
            OutputIntegrity::TruncatedByLineLimit => "truncated_by_line_limit",
            OutputIntegrity::TruncatedByByteLimit => "truncated_by_byte_limit",
        };
        write!(f, "{}", name)
    }
}

/// Per-execution limits applied by the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Maximum captured output lines per execution
    pub max_output_lines: usize,
    /// Maximum captured output bytes per execution
    pub max_output_bytes: usize,
    /// Optional wall-clock deadline (milliseconds). The interpreter has no
    /// cooperative cancellation: expiry retires the shared environment for
    /// re-bootstrap, which loses every session's interpreter globals.
    pub wall_time_limit_ms: Option<u64>,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        ExecutionLimits {
            max_output_lines: 2_000,
            max_output_bytes: 1024 * 1024, // 1 MiB
            wall_time_limit_ms: None,
        }
    }
}

/// One run request: a fixed caller-owned preamble plus the user's buffer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Optional setup preamble, not user-editable
    pub setup_code: Option<String>,
    /// Current editable buffer content
    pub user_code: String,
}

impl ExecutionRequest {
    pub fn new(user_code: impl Into<String>) -> Self {
        ExecutionRequest {
            setup_code: None,
            user_code: user_code.into(),
        }
    }

    pub fn with_setup(mut self, setup_code: impl Into<String>) -> Self {
        self.setup_code = Some(setup_code.into());
        self
    }

    /// Concatenate setup then user code as one logical unit.
    /// Neither part is validated here; faults surface from the runtime.
    pub fn composed_source(&self) -> String {
        match &self.setup_code {
            Some(setup) if !setup.is_empty() => format!("{}\n{}", setup, self.user_code),
            _ => self.user_code.clone(),
        }
    }
}

/// Fully-ordered capture of one execution. Created fresh per run and
/// discarded, never merged, when a new run starts or the session resets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured lines in strict emission order; on a fault the final entry
    /// is the error marker line
    pub output_lines: Vec<String>,
    pub status: TerminalStatus,
    pub output_integrity: OutputIntegrity,
    pub wall_time_ms: u64,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.status.is_success()
    }
}

/// Errors surfaced by the runtime core.
///
/// Interpreter faults are deliberately absent: they are contained inside
/// [`ExecutionResult`] as [`TerminalStatus::RuntimeError`] so user code can
/// never crash the host or poison the shared environment.
#[derive(Error, Debug)]
pub enum CellError {
    #[error("runtime bootstrap failed: {0}")]
    Load(String),

    #[error("invalid runtime state: {0}")]
    State(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composed_source_orders_setup_before_user_code() {
        let request = ExecutionRequest::new("print(2)").with_setup("import math");
        assert_eq!(request.composed_source(), "import math\nprint(2)");
    }

    #[test]
    fn composed_source_without_setup_is_user_code_alone() {
        let request = ExecutionRequest::new("print(2)");
        assert_eq!(request.composed_source(), "print(2)");

        let empty_setup = ExecutionRequest::new("print(2)").with_setup("");
        assert_eq!(empty_setup.composed_source(), "print(2)");
    }

    #[test]
    fn integrity_display_contract() {
        assert_eq!(format!("{}", OutputIntegrity::Complete), "complete");
        assert_eq!(
            format!("{}", OutputIntegrity::TruncatedByLineLimit),
            "truncated_by_line_limit"
        );
        assert_eq!(
            format!("{}", OutputIntegrity::TruncatedByByteLimit),
            "truncated_by_byte_limit"
        );
    }

    #[test]
    fn runtime_state_display_contract() {
        assert_eq!(format!("{}", RuntimeState::Unloaded), "unloaded");
        assert_eq!(format!("{}", RuntimeState::Loading), "loading");
        assert_eq!(format!("{}", RuntimeState::Ready), "ready");
        assert_eq!(format!("{}", RuntimeState::Failed), "failed");
    }

    #[test]
    fn default_limits_are_bounded() {
        let limits = ExecutionLimits::default();
        assert!(limits.max_output_lines > 0);
        assert!(limits.max_output_bytes > 0);
        assert!(limits.wall_time_limit_ms.is_none());
    }
}
