//! Scripted interpreter and bootstrap fixtures.
//!
//! Deterministic stand-ins for the host-supplied runtime, used by unit and
//! integration tests. The interpreter speaks a line-oriented micro-language
//! shaped like the cells this runtime hosts:
//!
//! ```text
//! print(1+1)        # integer expression, emits "2"
//! print("text")     # string literal, emits the text
//! sleep_ms(50)      # suspend mid-execution
//! fail("boom")      # fault with the given message
//! ```
//!
//! Integer division by zero faults with "division by zero"; any
//! unrecognized statement faults as a syntax error.

use crate::config::presets::EnvironmentEnvelope;
use crate::config::types::ExecutionLimits;
use crate::runtime::interpreter::{
    BootstrapError, Interpreter, InterpreterFault, OutputSink, RuntimeBootstrap,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Minimal envelope for tests; no packages, default limits.
pub fn test_envelope() -> EnvironmentEnvelope {
    EnvironmentEnvelope {
        id: "scripted-v1".to_string(),
        name: "Scripted test interpreter".to_string(),
        version: "1".to_string(),
        module_url: "https://example.com/scripted-runtime.js".to_string(),
        preload_packages: Vec::new(),
        startup_overhead_ms: 0,
        default_limits: ExecutionLimits::default(),
    }
}

/// Deterministic in-process interpreter with a replaceable output sink.
#[derive(Default)]
pub struct ScriptedInterpreter {
    sink: Mutex<Option<OutputSink>>,
}

impl ScriptedInterpreter {
    pub fn new() -> Self {
        ScriptedInterpreter {
            sink: Mutex::new(None),
        }
    }

    fn emit(&self, line: &str) {
        let sink = match self.sink.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(sink) = sink {
            sink(line);
        }
    }
}

#[async_trait]
impl Interpreter for ScriptedInterpreter {
    fn install_output_sink(&self, sink: OutputSink) {
        if let Ok(mut slot) = self.sink.lock() {
            *slot = Some(sink);
        }
    }

    fn clear_output_sink(&self) {
        if let Ok(mut slot) = self.sink.lock() {
            *slot = None;
        }
    }

    async fn run_source(&self, source: &str) -> Result<(), InterpreterFault> {
        for raw in source.lines() {
            let stmt = raw.trim();
            if stmt.is_empty() || stmt.starts_with('#') {
                continue;
            }

            if let Some(arg) = directive(stmt, "print") {
                match string_literal(arg) {
                    Some(text) => self.emit(&text),
                    None => {
                        let value = eval_int_expr(arg)?;
                        self.emit(&value.to_string());
                    }
                }
            } else if let Some(arg) = directive(stmt, "sleep_ms") {
                let ms: u64 = arg.trim().parse().map_err(|_| {
                    InterpreterFault::new(format!("invalid sleep duration: {}", arg.trim()))
                })?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
            } else if let Some(arg) = directive(stmt, "fail") {
                let message =
                    string_literal(arg).unwrap_or_else(|| arg.trim().to_string());
                return Err(InterpreterFault::new(message));
            } else {
                return Err(InterpreterFault::new(format!(
                    "syntax error: unrecognized statement '{}'",
                    stmt
                )));
            }
        }
        Ok(())
    }
}

/// Bootstrap factory with injectable delay and failures, counting calls so
/// tests can prove single-flight.
pub struct ScriptedBootstrap {
    delay: Duration,
    failures_remaining: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedBootstrap {
    pub fn new() -> Self {
        ScriptedBootstrap {
            delay: Duration::ZERO,
            failures_remaining: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Suspend this long inside every bootstrap call.
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    /// Fail the first `n` bootstrap calls before succeeding.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Number of bootstrap invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedBootstrap {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeBootstrap for ScriptedBootstrap {
    async fn bootstrap(
        &self,
        envelope: &EnvironmentEnvelope,
    ) -> Result<Arc<dyn Interpreter>, BootstrapError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BootstrapError::new(format!(
                "scripted bootstrap failure for envelope {}",
                envelope.id
            )));
        }

        Ok(Arc::new(ScriptedInterpreter::new()))
    }
}

fn directive<'a>(stmt: &'a str, name: &str) -> Option<&'a str> {
    let rest = stmt.strip_prefix(name)?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('(')?;
    rest.strip_suffix(')')
}

fn string_literal(arg: &str) -> Option<String> {
    let arg = arg.trim();
    for quote in ['"', '\''] {
        if arg.len() >= 2 && arg.starts_with(quote) && arg.ends_with(quote) {
            let inner = &arg[1..arg.len() - 1];
            if !inner.contains(quote) {
                return Some(inner.to_string());
            }
        }
    }
    None
}

/// Integer expression evaluator: + - * / with the usual precedence,
/// parentheses, unary minus.
fn eval_int_expr(expr: &str) -> Result<i64, InterpreterFault> {
    let mut parser = ExprParser {
        src: expr.as_bytes(),
        pos: 0,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(InterpreterFault::new(format!(
            "syntax error: unexpected trailing input in expression '{}'",
            expr.trim()
        )));
    }
    Ok(value)
}

struct ExprParser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl ExprParser<'_> {
    fn expr(&mut self) -> Result<i64, InterpreterFault> {
        let mut value = self.term()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    value = value.wrapping_add(self.term()?);
                }
                Some(b'-') => {
                    self.pos += 1;
                    value = value.wrapping_sub(self.term()?);
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<i64, InterpreterFault> {
        let mut value = self.factor()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    value = value.wrapping_mul(self.factor()?);
                }
                Some(b'/') => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0 {
                        return Err(InterpreterFault::new("division by zero"));
                    }
                    value = value.wrapping_div(divisor);
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<i64, InterpreterFault> {
        self.skip_ws();
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(self.factor()?.wrapping_neg())
            }
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                self.skip_ws();
                if self.peek() == Some(b')') {
                    self.pos += 1;
                    Ok(value)
                } else {
                    Err(InterpreterFault::new(
                        "syntax error: expected ')' in expression",
                    ))
                }
            }
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
                let text = std::str::from_utf8(&self.src[start..self.pos])
                    .map_err(|_| InterpreterFault::new("invalid integer literal"))?;
                text.parse::<i64>().map_err(|_| {
                    InterpreterFault::new(format!("integer literal out of range: {}", text))
                })
            }
            _ => Err(InterpreterFault::new(
                "syntax error: expected integer, '-', or '(' in expression",
            )),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }
}
