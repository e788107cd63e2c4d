// Envelope validation
// An envelope is checked before it is handed to a bootstrap factory so a
// malformed descriptor fails fast with actionable errors instead of a
// confusing mid-bootstrap failure.

use crate::config::presets::EnvironmentEnvelope;
use crate::config::types::{CellError, Result};

/// Validation result with detailed errors
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate an environment envelope. Errors are fatal; warnings are
/// returned for the caller to log.
pub fn validate_envelope(envelope: &EnvironmentEnvelope) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_identity(envelope, &mut result);
    validate_module_url(envelope, &mut result);
    validate_packages(envelope, &mut result);
    validate_limits(envelope, &mut result);

    if !result.is_valid() {
        return Err(CellError::Config(format!(
            "envelope validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    Ok(result)
}

fn validate_identity(envelope: &EnvironmentEnvelope, result: &mut ValidationResult) {
    if envelope.id.trim().is_empty() {
        result.add_error("envelope id cannot be empty".to_string());
    }
    if envelope.version.trim().is_empty() {
        result.add_error(format!("envelope {} has an empty version", envelope.id));
    }
}

fn validate_module_url(envelope: &EnvironmentEnvelope, result: &mut ValidationResult) {
    let url = envelope.module_url.trim();
    if url.is_empty() {
        result.add_error(format!("envelope {} has an empty module_url", envelope.id));
        return;
    }

    if url.starts_with("http://") {
        result.add_warning(format!(
            "envelope {} loads its runtime module over plain http: {}",
            envelope.id, url
        ));
    } else if !url.starts_with("https://") {
        result.add_error(format!(
            "envelope {} module_url must be an http(s) URL: {}",
            envelope.id, url
        ));
    }
}

fn validate_packages(envelope: &EnvironmentEnvelope, result: &mut ValidationResult) {
    let mut seen = std::collections::HashSet::new();
    for package in &envelope.preload_packages {
        if package.trim().is_empty() {
            result.add_error(format!(
                "envelope {} lists an empty preload package name",
                envelope.id
            ));
        } else if !seen.insert(package.as_str()) {
            result.add_warning(format!(
                "envelope {} lists preload package '{}' more than once",
                envelope.id, package
            ));
        }
    }
}

fn validate_limits(envelope: &EnvironmentEnvelope, result: &mut ValidationResult) {
    let limits = &envelope.default_limits;

    if limits.max_output_lines == 0 {
        result.add_error("max_output_lines cannot be zero".to_string());
    }
    if limits.max_output_bytes == 0 {
        result.add_error("max_output_bytes cannot be zero".to_string());
    }
    if let Some(wall_ms) = limits.wall_time_limit_ms {
        if wall_ms == 0 {
            result.add_error("wall_time_limit_ms cannot be zero".to_string());
        } else if wall_ms < 100 {
            result.add_warning(format!(
                "wall_time_limit_ms {} is very low, interpreter startup alone may exceed it",
                wall_ms
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::presets::builtin_envelopes;
    use crate::config::types::ExecutionLimits;

    fn envelope() -> EnvironmentEnvelope {
        EnvironmentEnvelope {
            id: "test-v1".to_string(),
            name: "Test".to_string(),
            version: "1".to_string(),
            module_url: "https://example.com/runtime.js".to_string(),
            preload_packages: Vec::new(),
            startup_overhead_ms: 100,
            default_limits: ExecutionLimits::default(),
        }
    }

    #[test]
    fn builtin_envelopes_validate_cleanly() {
        for envelope in builtin_envelopes().into_values() {
            let result = validate_envelope(&envelope).unwrap();
            assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        }
    }

    #[test]
    fn empty_id_is_fatal() {
        let mut envelope = envelope();
        envelope.id = "  ".to_string();
        assert!(validate_envelope(&envelope).is_err());
    }

    #[test]
    fn non_http_module_url_is_fatal() {
        let mut envelope = envelope();
        envelope.module_url = "file:///tmp/runtime.js".to_string();
        assert!(validate_envelope(&envelope).is_err());
    }

    #[test]
    fn plain_http_module_url_warns() {
        let mut envelope = envelope();
        envelope.module_url = "http://example.com/runtime.js".to_string();
        let result = validate_envelope(&envelope).unwrap();
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn duplicate_preload_packages_warn() {
        let mut envelope = envelope();
        envelope.preload_packages = vec!["numpy".to_string(), "numpy".to_string()];
        let result = validate_envelope(&envelope).unwrap();
        assert!(result.warnings[0].contains("more than once"));
    }

    #[test]
    fn zero_output_limits_are_fatal() {
        let mut envelope = envelope();
        envelope.default_limits.max_output_lines = 0;
        assert!(validate_envelope(&envelope).is_err());
    }

    #[test]
    fn zero_wall_limit_is_fatal() {
        let mut envelope = envelope();
        envelope.default_limits.wall_time_limit_ms = Some(0);
        assert!(validate_envelope(&envelope).is_err());
    }
}
