//! Host-facing runtime seams.
//!
//! The core stays interpreter-agnostic. The hosting environment supplies a
//! bootstrap factory that yields an interpreter handle; the handle exposes
//! exactly what the engine needs: an output sink slot and a run primitive.

use crate::config::presets::EnvironmentEnvelope;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Fault raised by executed code inside the interpreter (parse error,
/// runtime exception, unhandled signal). Never fatal to the host.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct InterpreterFault {
    pub message: String,
}

impl InterpreterFault {
    pub fn new(message: impl Into<String>) -> Self {
        InterpreterFault {
            message: message.into(),
        }
    }
}

/// Bootstrap failure (network, malformed module, initialization exception).
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct BootstrapError {
    pub message: String,
}

impl BootstrapError {
    pub fn new(message: impl Into<String>) -> Self {
        BootstrapError {
            message: message.into(),
        }
    }
}

/// Output sink installed for one execution. Receives emitted text chunks;
/// a chunk may span multiple lines.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Handle to a bootstrapped interpreter.
///
/// Implementations hold mutable global state (imported modules, top-level
/// bindings) and a single replaceable output sink, so the engine serializes
/// access; implementations do not need their own execution queue.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Replace the interpreter's output sink. The previous sink, if any,
    /// stops receiving output.
    fn install_output_sink(&self, sink: OutputSink);

    /// Remove the current sink. Output emitted with no sink installed is
    /// discarded.
    fn clear_output_sink(&self);

    /// Run source text to completion. Resolves on clean completion and
    /// faults otherwise; output is reported through the installed sink.
    async fn run_source(&self, source: &str) -> Result<(), InterpreterFault>;
}

/// Host-supplied bootstrap procedure for an interpreter environment.
///
/// Module injection must be idempotent: if the runtime module named by the
/// envelope is already present in the process, implementations skip the
/// injection and proceed directly to initialization. The loader guarantees
/// at most one bootstrap call is in flight at a time.
#[async_trait]
pub trait RuntimeBootstrap: Send + Sync {
    async fn bootstrap(
        &self,
        envelope: &EnvironmentEnvelope,
    ) -> Result<Arc<dyn Interpreter>, BootstrapError>;
}
