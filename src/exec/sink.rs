/// Output Boundaries and Collector Robustness
///
/// Each execution gets a fresh bounded sink. Collection stops at the line
/// or byte cap with an integrity classification instead of growing without
/// bound, and the close latch drops anything a runaway emitter produces
/// after its run has already been reported.
use crate::config::types::{ExecutionLimits, OutputIntegrity};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

struct SinkInner {
    lines: Vec<String>,
    bytes: usize,
    integrity: OutputIntegrity,
}

/// Per-invocation line collector with bounded collection.
pub struct LineSink {
    max_lines: usize,
    max_bytes: usize,
    closed: AtomicBool,
    inner: Mutex<SinkInner>,
}

impl LineSink {
    pub fn new(limits: &ExecutionLimits) -> Self {
        LineSink {
            max_lines: limits.max_output_lines,
            max_bytes: limits.max_output_bytes,
            closed: AtomicBool::new(false),
            inner: Mutex::new(SinkInner {
                lines: Vec::new(),
                bytes: 0,
                integrity: OutputIntegrity::Complete,
            }),
        }
    }

    /// Append one emitted line in emission order, subject to the caps.
    /// Lines pushed after `close` are dropped.
    pub fn push(&self, line: &str) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let mut inner = self.lock_inner();
        if inner.integrity != OutputIntegrity::Complete {
            return;
        }

        if inner.lines.len() >= self.max_lines {
            inner.integrity = OutputIntegrity::TruncatedByLineLimit;
            log::warn!(
                "Output truncated at {} lines; further output is dropped",
                self.max_lines
            );
            return;
        }

        if inner.bytes + line.len() > self.max_bytes {
            inner.integrity = OutputIntegrity::TruncatedByByteLimit;
            log::warn!(
                "Output truncated at {} bytes; further output is dropped",
                self.max_bytes
            );
            return;
        }

        inner.bytes += line.len();
        inner.lines.push(line.to_string());
    }

    /// Close the sink and take the collected lines with their integrity
    /// classification.
    pub fn close(&self) -> (Vec<String>, OutputIntegrity) {
        self.closed.store(true, Ordering::Release);
        let mut inner = self.lock_inner();
        (std::mem::take(&mut inner.lines), inner.integrity)
    }

    fn lock_inner(&self) -> MutexGuard<'_, SinkInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_lines: usize, max_bytes: usize) -> ExecutionLimits {
        ExecutionLimits {
            max_output_lines: max_lines,
            max_output_bytes: max_bytes,
            wall_time_limit_ms: None,
        }
    }

    #[test]
    fn collects_lines_in_order() {
        let sink = LineSink::new(&limits(10, 1024));
        sink.push("a");
        sink.push("b");
        sink.push("c");
        let (lines, integrity) = sink.close();
        assert_eq!(lines, vec!["a", "b", "c"]);
        assert_eq!(integrity, OutputIntegrity::Complete);
    }

    #[test]
    fn line_cap_truncates_and_classifies() {
        let sink = LineSink::new(&limits(2, 1024));
        sink.push("a");
        sink.push("b");
        sink.push("c");
        let (lines, integrity) = sink.close();
        assert_eq!(lines, vec!["a", "b"]);
        assert_eq!(integrity, OutputIntegrity::TruncatedByLineLimit);
    }

    #[test]
    fn byte_cap_truncates_and_classifies() {
        let sink = LineSink::new(&limits(10, 4));
        sink.push("ab");
        sink.push("cd");
        sink.push("e");
        let (lines, integrity) = sink.close();
        assert_eq!(lines, vec!["ab", "cd"]);
        assert_eq!(integrity, OutputIntegrity::TruncatedByByteLimit);
    }

    #[test]
    fn pushes_after_close_are_dropped() {
        let sink = LineSink::new(&limits(10, 1024));
        sink.push("kept");
        let (lines, _) = sink.close();
        assert_eq!(lines, vec!["kept"]);

        sink.push("late");
        let (lines, integrity) = sink.close();
        assert!(lines.is_empty());
        assert_eq!(integrity, OutputIntegrity::Complete);
    }

    #[test]
    fn truncation_is_sticky() {
        let sink = LineSink::new(&limits(1, 1024));
        sink.push("a");
        sink.push("b");
        sink.push("c");
        let (lines, integrity) = sink.close();
        assert_eq!(lines, vec!["a"]);
        assert_eq!(integrity, OutputIntegrity::TruncatedByLineLimit);
    }
}
