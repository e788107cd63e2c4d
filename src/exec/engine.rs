//! Serialized execution against the shared environment.
//!
//! The underlying interpreter holds mutable global state and one replaceable
//! output sink, so at most one execution may be in flight per environment.
//! That is an explicit invariant here, enforced by a fair queue, not an
//! accident of UI event ordering.

use crate::config::types::{
    CellError, ExecutionLimits, ExecutionRequest, ExecutionResult, Result, TerminalStatus,
};
use crate::exec::sink::LineSink;
use crate::observability::audit::events;
use crate::runtime::interpreter::InterpreterFault;
use crate::runtime::loader::RuntimeEnvironment;
use std::sync::Arc;
use std::time::{Duration, Instant};

enum RunOutcome {
    Finished(std::result::Result<(), InterpreterFault>),
    DeadlineExpired,
}

/// Runs a code buffer against a ready environment and returns a
/// fully-ordered capture of everything it printed, or a structured error.
pub struct ExecutionEngine {
    limits: ExecutionLimits,
}

impl ExecutionEngine {
    pub fn new(limits: ExecutionLimits) -> Self {
        ExecutionEngine { limits }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Execute setup then user code as one logical unit.
    ///
    /// Interpreter faults never escape: lines emitted before a fault are
    /// kept, the fault is appended as the final marker line, and the
    /// terminal status reports it. The only error path is
    /// [`CellError::State`], for an environment that is no longer valid —
    /// a caller-sequencing bug, not a user fault.
    pub async fn execute(
        &self,
        env: &RuntimeEnvironment,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult> {
        if env.is_retired() {
            return Err(retired_error(env));
        }

        // Fair FIFO queue: concurrent requests from different sessions are
        // serviced one at a time, so output lines cannot be misattributed.
        let _serialized = env.run_lock().lock().await;

        // The environment may have been retired while this request queued.
        if env.is_retired() {
            return Err(retired_error(env));
        }

        events::execution_started(env.envelope_id(), env.generation());

        let sink = Arc::new(LineSink::new(&self.limits));
        let tap = sink.clone();
        env.interpreter().install_output_sink(Arc::new(move |chunk: &str| {
            for line in chunk.lines() {
                tap.push(line);
            }
        }));

        let source = request.composed_source();
        let started = Instant::now();
        let outcome = match self.limits.wall_time_limit_ms {
            Some(limit_ms) => {
                let deadline = Duration::from_millis(limit_ms);
                match tokio::time::timeout(deadline, env.interpreter().run_source(&source)).await {
                    Ok(run) => RunOutcome::Finished(run),
                    Err(_) => RunOutcome::DeadlineExpired,
                }
            }
            None => RunOutcome::Finished(env.interpreter().run_source(&source).await),
        };
        let wall_time_ms = started.elapsed().as_millis() as u64;

        // Uninstall before reporting so a completed run's sink can never
        // swallow lines that belong to a later invocation.
        env.interpreter().clear_output_sink();
        let (mut output_lines, output_integrity) = sink.close();

        let status = match outcome {
            RunOutcome::Finished(Ok(())) => TerminalStatus::Success,
            RunOutcome::Finished(Err(fault)) => {
                output_lines.push(format!("Error: {}", fault.message));
                TerminalStatus::RuntimeError {
                    message: fault.message,
                }
            }
            RunOutcome::DeadlineExpired => {
                // Dropping the timed-out future cannot stop work already
                // inside the interpreter; the environment is retired and
                // rebuilt on next use instead.
                let limit_ms = self.limits.wall_time_limit_ms.unwrap_or(0);
                events::deadline_expired(env.envelope_id(), env.generation(), limit_ms);
                env.retire();
                let message = format!(
                    "wall time limit exceeded ({} ms); interpreter environment was torn down",
                    limit_ms
                );
                output_lines.push(format!("Error: {}", message));
                TerminalStatus::RuntimeError { message }
            }
        };

        events::execution_finished(
            env.envelope_id(),
            env.generation(),
            status.name(),
            wall_time_ms,
            output_integrity,
        );

        Ok(ExecutionResult {
            output_lines,
            status,
            output_integrity,
            wall_time_ms,
        })
    }
}

fn retired_error(env: &RuntimeEnvironment) -> CellError {
    CellError::State(format!(
        "environment {} (generation {}) is retired; call ensure_ready again",
        env.envelope_id(),
        env.generation()
    ))
}
