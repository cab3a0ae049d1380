//! Ingestion progress reporting.
//!
//! The coordinator emits one event per state change and per embedded
//! batch. Reporters are fire-and-forget: a reporter must not fail the
//! ingestion that feeds it.

use serde::Serialize;
use std::sync::Mutex;

/// One progress event during ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestProgress {
    /// Current session status as a lowercase string.
    pub status: String,
    pub message: String,
    pub chunks_done: usize,
    pub chunks_total: usize,
    /// 0–100, rounded down. 100 only when all chunks are written.
    pub percent: u8,
}

impl IngestProgress {
    pub fn new(status: &str, message: impl Into<String>, done: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100
        } else {
            ((done * 100) / total).min(100) as u8
        };
        Self {
            status: status.to_string(),
            message: message.into(),
            chunks_done: done,
            chunks_total: total,
            percent,
        }
    }
}

/// Sink for ingestion progress events.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: IngestProgress);
}

/// Discards all events.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _progress: IngestProgress) {}
}

/// Buffers events in memory, for tests and polling callers.
#[derive(Default)]
pub struct CollectingProgress {
    events: Mutex<Vec<IngestProgress>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<IngestProgress> {
        self.events.lock().expect("progress lock poisoned").clone()
    }
}

impl ProgressReporter for CollectingProgress {
    fn report(&self, progress: IngestProgress) {
        self.events
            .lock()
            .expect("progress lock poisoned")
            .push(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds_down() {
        let p = IngestProgress::new("ingesting", "batch", 1, 3);
        assert_eq!(p.percent, 33);
    }

    #[test]
    fn test_zero_total_is_complete() {
        let p = IngestProgress::new("ingested", "done", 0, 0);
        assert_eq!(p.percent, 100);
    }

    #[test]
    fn test_collecting_reporter_keeps_order() {
        let reporter = CollectingProgress::new();
        reporter.report(IngestProgress::new("ingesting", "start", 0, 2));
        reporter.report(IngestProgress::new("ingesting", "batch", 2, 2));
        let events = reporter.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "start");
        assert_eq!(events[1].percent, 100);
    }
}
