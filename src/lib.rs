//! codecell: an embedded code-execution runtime for interactive code cells
//!
//! Bootstraps a heavyweight interpreter environment on demand inside a host
//! process, executes user-edited code against it, and safely surfaces
//! output or errors without crashing the host session.
//!
//! # Architecture
//!
//! Three components, leaves first:
//!
//! ## Runtime Lifecycle ([`runtime`])
//! - [`runtime::interpreter`]: host-facing seams (interpreter handle, bootstrap factory)
//! - [`runtime::loader`]: single-flight bootstrap and the process-wide environment cache
//!
//! ## Execution Control ([`exec`])
//! - [`exec::engine`]: serialized execution with fault containment
//! - [`exec::sink`]: bounded per-invocation output capture
//!
//! ## Session State ([`session`])
//! - [`session::controller`]: per-cell Idle/Running state machine over run/reset/edit
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: shared type definitions and the error taxonomy
//! - [`config::presets`]: versioned interpreter environment envelopes
//! - [`config::validator`]: envelope validation matrix
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: structured lifecycle events
//!
//! ## Testing Infrastructure ([`testing`])
//! - [`testing::script`]: scripted interpreter/bootstrap fixtures
//!
//! # Design Principles
//!
//! 1. **Explicit lifecycle** - the environment cache is stateful
//!    (`Unloaded`/`Loading`/`Ready`/`Failed`), never an ambient flag
//! 2. **Single-flight loads** - concurrent bootstrap requests collapse
//!    into one, with every caller sharing the outcome
//! 3. **Serialized execution** - one run at a time per environment,
//!    enforced by a fair queue rather than assumed from UI ordering
//! 4. **Faults are data** - user-code errors land in the output capture,
//!    never across the engine boundary

// Configuration
pub mod config;

// Execution Control
pub mod exec;

// Observability
pub mod observability;

// Runtime Lifecycle
pub mod runtime;

// Session State
pub mod session;

// Testing Infrastructure
pub mod testing;

// Re-export commonly used types for convenience
pub use config::presets::EnvironmentEnvelope;
pub use config::types::{
    CellError, ExecutionLimits, ExecutionRequest, ExecutionResult, OutputIntegrity, Result,
    RuntimeState, TerminalStatus,
};
pub use exec::engine::ExecutionEngine;
pub use runtime::interpreter::{
    BootstrapError, Interpreter, InterpreterFault, OutputSink, RuntimeBootstrap,
};
pub use runtime::loader::{RuntimeEnvironment, RuntimeLoader};
pub use session::controller::{RunDisposition, RunState, SessionController, SessionSnapshot};
