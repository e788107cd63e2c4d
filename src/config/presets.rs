/// Interpreter Environment Envelopes
///
/// Envelopes are explicit, immutable, and versioned bootstrap descriptors.
/// Each envelope names the external runtime module to load, the support
/// packages to initialize after it, expected startup overhead, and default
/// execution limits.
use crate::config::types::{CellError, ExecutionLimits, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Versioned interpreter environment envelope
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentEnvelope {
    /// Envelope ID (e.g., "python-wasm-v1")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Version of this envelope
    pub version: String,
    /// Location of the external runtime module to inject and load
    pub module_url: String,
    /// Support packages initialized after the module loads
    pub preload_packages: Vec<String>,
    /// Expected startup overhead (milliseconds), used for load-state UI hints
    pub startup_overhead_ms: u64,
    /// Default execution limits for sessions on this environment
    pub default_limits: ExecutionLimits,
}

/// Built-in envelope registry.
///
/// The full Python envelope matches what the courseware ships: the wasm
/// Python runtime plus the numeric stack its lessons import. The slim
/// variant skips package preloads for cells that only need the core
/// language.
pub fn builtin_envelopes() -> HashMap<String, EnvironmentEnvelope> {
    let mut envelopes = HashMap::new();

    envelopes.insert(
        "python-wasm-v1".to_string(),
        EnvironmentEnvelope {
            id: "python-wasm-v1".to_string(),
            name: "Python (wasm, numeric stack)".to_string(),
            version: "1".to_string(),
            module_url: "https://cdn.jsdelivr.net/pyodide/v0.25.0/full/pyodide.js".to_string(),
            preload_packages: vec!["numpy".to_string(), "pandas".to_string()],
            startup_overhead_ms: 8_000,
            default_limits: ExecutionLimits::default(),
        },
    );

    envelopes.insert(
        "python-wasm-slim-v1".to_string(),
        EnvironmentEnvelope {
            id: "python-wasm-slim-v1".to_string(),
            name: "Python (wasm, no preloads)".to_string(),
            version: "1".to_string(),
            module_url: "https://cdn.jsdelivr.net/pyodide/v0.25.0/full/pyodide.js".to_string(),
            preload_packages: Vec::new(),
            startup_overhead_ms: 3_000,
            default_limits: ExecutionLimits::default(),
        },
    );

    envelopes
}

/// Look up a built-in envelope by id.
pub fn envelope_for(id: &str) -> Result<EnvironmentEnvelope> {
    builtin_envelopes().remove(id).ok_or_else(|| {
        CellError::Config(format!("unknown environment envelope: {id}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_envelopes_are_self_consistent() {
        for (key, envelope) in builtin_envelopes() {
            assert_eq!(key, envelope.id);
            assert!(!envelope.module_url.is_empty());
            assert!(!envelope.version.is_empty());
        }
    }

    #[test]
    fn full_python_envelope_preloads_numeric_stack() {
        let envelope = envelope_for("python-wasm-v1").unwrap();
        assert!(envelope.preload_packages.contains(&"numpy".to_string()));
        assert!(envelope.preload_packages.contains(&"pandas".to_string()));
    }

    #[test]
    fn unknown_envelope_is_a_config_error() {
        let err = envelope_for("ruby-wasm-v1").unwrap_err();
        assert!(err.to_string().contains("unknown environment envelope"));
    }
}
