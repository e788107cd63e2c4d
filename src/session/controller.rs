//! Per-cell session state machine.
//!
//! One controller owns one editable code buffer and its run/reset
//! lifecycle. Sessions never share buffers or output logs; they share only
//! the process-wide runtime environment behind the loader.

use crate::config::types::{CellError, ExecutionRequest, ExecutionResult, Result, TerminalStatus};
use crate::exec::engine::ExecutionEngine;
use crate::observability::audit::events;
use crate::runtime::loader::RuntimeLoader;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Session run lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
}

/// Point-in-time view of a session for the surrounding UI.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub current_code: String,
    pub output_log: Vec<String>,
    pub run_state: RunState,
}

/// Outcome of a `run` request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunDisposition {
    /// The run executed; the session's output log holds the captured lines
    Completed(TerminalStatus),
    /// The session was already running; no second execution was started
    AlreadyRunning,
}

struct SessionInner {
    current_code: String,
    output_log: Vec<String>,
    run_state: RunState,
}

/// Owns the editable state for one code cell and sequences run/reset.
pub struct SessionController {
    session_id: String,
    initial_code: String,
    setup_code: Option<String>,
    loader: Arc<RuntimeLoader>,
    engine: Arc<ExecutionEngine>,
    inner: Mutex<SessionInner>,
}

impl SessionController {
    /// Create a session over an immutable baseline. Leading and trailing
    /// whitespace in the baseline is trimmed, as the courseware authors
    /// write cell bodies in indented content blocks.
    pub fn new(
        initial_code: impl Into<String>,
        loader: Arc<RuntimeLoader>,
        engine: Arc<ExecutionEngine>,
    ) -> Self {
        let initial_code = initial_code.into().trim().to_string();
        SessionController {
            session_id: Uuid::new_v4().to_string(),
            initial_code: initial_code.clone(),
            setup_code: None,
            loader,
            engine,
            inner: Mutex::new(SessionInner {
                current_code: initial_code,
                output_log: Vec::new(),
                run_state: RunState::Idle,
            }),
        }
    }

    /// Attach a fixed preamble that runs before the user's buffer on every
    /// run. Not user-editable and not part of the visible code.
    pub fn with_setup_code(mut self, setup_code: impl Into<String>) -> Self {
        self.setup_code = Some(setup_code.into());
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn initial_code(&self) -> &str {
        &self.initial_code
    }

    pub fn run_state(&self) -> RunState {
        self.lock_inner().run_state
    }

    /// Current state for the UI: buffer, log, run state.
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock_inner();
        SessionSnapshot {
            current_code: inner.current_code.clone(),
            output_log: inner.output_log.clone(),
            run_state: inner.run_state,
        }
    }

    /// Replace the editable buffer. Permitted only while `Idle`; returns
    /// false (and leaves the buffer untouched) during a run.
    pub fn set_code(&self, text: impl Into<String>) -> bool {
        let mut inner = self.lock_inner();
        if inner.run_state == RunState::Running {
            log::warn!(
                "Session {}: edit ignored while running",
                self.session_id
            );
            return false;
        }
        inner.current_code = text.into();
        true
    }

    /// Restore the baseline code and clear the output log. Permitted only
    /// while `Idle`; does not touch the runtime environment.
    pub fn reset(&self) -> bool {
        let mut inner = self.lock_inner();
        if inner.run_state == RunState::Running {
            log::warn!(
                "Session {}: reset ignored while running",
                self.session_id
            );
            return false;
        }
        inner.current_code = self.initial_code.clone();
        inner.output_log.clear();
        drop(inner);

        events::session_reset(&self.session_id);
        true
    }

    /// Run the current buffer against the shared environment.
    ///
    /// A second `run` while one is in flight — including while the
    /// bootstrap is still loading — is answered with
    /// [`RunDisposition::AlreadyRunning`] and starts nothing. On success
    /// the engine's captured lines (terminal marker included) replace the
    /// output log and the session returns to `Idle` regardless of terminal
    /// status. A bootstrap failure leaves the previous log intact and the
    /// session `Idle`.
    pub async fn run(&self) -> Result<RunDisposition> {
        let code = {
            let mut inner = self.lock_inner();
            if inner.run_state == RunState::Running {
                drop(inner);
                events::run_rejected(&self.session_id);
                return Ok(RunDisposition::AlreadyRunning);
            }
            inner.run_state = RunState::Running;
            inner.current_code.clone()
        };

        let run_id = Uuid::new_v4().to_string();
        events::run_started(&self.session_id, &run_id);

        match self.execute_current(code).await {
            Ok(result) => {
                let status = result.status.clone();
                let mut inner = self.lock_inner();
                inner.output_log = result.output_lines;
                inner.run_state = RunState::Idle;
                drop(inner);

                events::run_finished(&self.session_id, &run_id, status.name());
                Ok(RunDisposition::Completed(status))
            }
            Err(err) => {
                let mut inner = self.lock_inner();
                inner.run_state = RunState::Idle;
                drop(inner);

                let label = match &err {
                    CellError::Load(_) => "load_failure",
                    CellError::State(_) => "state_error",
                    CellError::Config(_) => "config_error",
                };
                events::run_finished(&self.session_id, &run_id, label);
                Err(err)
            }
        }
    }

    async fn execute_current(&self, code: String) -> Result<ExecutionResult> {
        let env = self.loader.ensure_ready().await?;

        // Discard the previous log only once a ready environment is in
        // hand; a failed bootstrap keeps the old output visible.
        self.lock_inner().output_log.clear();

        let request = ExecutionRequest {
            setup_code: self.setup_code.clone(),
            user_code: code,
        };

        match self.engine.execute(&env, &request).await {
            Err(CellError::State(_)) => {
                // The environment was retired while this run queued behind
                // another session's deadline teardown. One fresh handle
                // covers it.
                let env = self.loader.ensure_ready().await?;
                self.engine.execute(&env, &request).await
            }
            other => other,
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ExecutionLimits;
    use crate::testing::script::{test_envelope, ScriptedBootstrap};

    fn harness() -> (Arc<RuntimeLoader>, Arc<ExecutionEngine>) {
        let loader = Arc::new(
            RuntimeLoader::new(test_envelope(), Arc::new(ScriptedBootstrap::new())).unwrap(),
        );
        let engine = Arc::new(ExecutionEngine::new(ExecutionLimits::default()));
        (loader, engine)
    }

    #[tokio::test]
    async fn run_populates_the_output_log() {
        let (loader, engine) = harness();
        let session = SessionController::new("print(1+1)", loader, engine);

        let disposition = session.run().await.unwrap();
        assert_eq!(
            disposition,
            RunDisposition::Completed(TerminalStatus::Success)
        );

        let snapshot = session.snapshot();
        assert_eq!(snapshot.output_log, vec!["2"]);
        assert_eq!(snapshot.run_state, RunState::Idle);
    }

    #[tokio::test]
    async fn initial_code_is_trimmed() {
        let (loader, engine) = harness();
        let session = SessionController::new("\n  print(1)\n", loader, engine);
        assert_eq!(session.initial_code(), "print(1)");
        assert_eq!(session.snapshot().current_code, "print(1)");
    }

    #[tokio::test]
    async fn edit_and_reset_follow_the_baseline() {
        let (loader, engine) = harness();
        let session = SessionController::new("print(1+1)", loader, engine);

        assert!(session.set_code("print(5)"));
        session.run().await.unwrap();
        assert_eq!(session.snapshot().output_log, vec!["5"]);

        assert!(session.reset());
        let snapshot = session.snapshot();
        assert_eq!(snapshot.current_code, "print(1+1)");
        assert!(snapshot.output_log.is_empty());
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let (loader, engine) = harness();
        let session = SessionController::new("print(1)", loader, engine);

        assert!(session.set_code("print(2)"));
        assert!(session.reset());
        assert!(session.reset());
        assert_eq!(session.snapshot().current_code, "print(1)");
    }

    #[tokio::test]
    async fn fault_marker_becomes_the_log_and_session_returns_to_idle() {
        let (loader, engine) = harness();
        let session = SessionController::new("print(1/0)", loader, engine);

        let disposition = session.run().await.unwrap();
        assert_eq!(
            disposition,
            RunDisposition::Completed(TerminalStatus::RuntimeError {
                message: "division by zero".to_string()
            })
        );

        let snapshot = session.snapshot();
        assert_eq!(snapshot.output_log, vec!["Error: division by zero"]);
        assert_eq!(snapshot.run_state, RunState::Idle);
    }

    #[tokio::test]
    async fn load_failure_keeps_previous_log_and_returns_to_idle() {
        let bootstrap = Arc::new(ScriptedBootstrap::new().failing_first(1));
        let loader = Arc::new(RuntimeLoader::new(test_envelope(), bootstrap).unwrap());
        let engine = Arc::new(ExecutionEngine::new(ExecutionLimits::default()));
        let session = SessionController::new("print(1)", loader, engine);

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, CellError::Load(_)));
        assert_eq!(session.run_state(), RunState::Idle);

        // Retry succeeds once the bootstrap recovers.
        let disposition = session.run().await.unwrap();
        assert_eq!(
            disposition,
            RunDisposition::Completed(TerminalStatus::Success)
        );
        assert_eq!(session.snapshot().output_log, vec!["1"]);
    }

    #[tokio::test]
    async fn setup_code_is_invisible_but_runs_first() {
        let (loader, engine) = harness();
        let session = SessionController::new("print(\"user\")", loader, engine)
            .with_setup_code("print(\"setup\")");

        assert_eq!(session.snapshot().current_code, "print(\"user\")");
        session.run().await.unwrap();
        assert_eq!(session.snapshot().output_log, vec!["setup", "user"]);
    }
}
