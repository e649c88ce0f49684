//! Trace sinks.
//!
//! Receive every `CheckResult` as it is produced. Checks may run on several
//! threads, so sinks serialize their writes.

use parking_lot::Mutex;
use tracing::info;

use crate::check::CheckResult;

/// Receiver of check results
pub trait TraceSink: Send + Sync {
    fn record(&self, result: &CheckResult);
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NilSink;

impl TraceSink for NilSink {
    fn record(&self, _result: &CheckResult) {}
}

/// Sink collecting results in arrival order
#[derive(Debug, Default)]
pub struct MemorySink {
    results: Mutex<Vec<CheckResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded results
    pub fn results(&self) -> Vec<CheckResult> {
        self.results.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }

    pub fn clear(&self) {
        self.results.lock().clear();
    }
}

impl TraceSink for MemorySink {
    fn record(&self, result: &CheckResult) {
        self.results.lock().push(result.clone());
    }
}

/// Sink emitting one `tracing` event per result
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&self, result: &CheckResult) {
        info!(
            step = result.kind.step(),
            kind = %result.kind,
            passed = result.passed,
            "{}",
            result.label
        );
    }
}
