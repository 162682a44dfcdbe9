use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::orchestrator::RunSummary;

pub const DEFAULT_LOG_CAPACITY: usize = 500;
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Fixed-capacity FIFO; pushing past capacity evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: T) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Diagnostic event buffer shared by the orchestrator's components.
///
/// Every entry is also emitted as a `tracing` event so the process log and the
/// in-memory buffer carry the same story.
#[derive(Debug)]
pub struct Journal {
    entries: Mutex<BoundedBuffer<LogEntry>>,
}

impl Default for Journal {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl Journal {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(BoundedBuffer::new(capacity)),
        }
    }

    pub fn info(&self, message: impl Into<String>, payload: Option<Value>) {
        self.record(LogLevel::Info, message.into(), payload);
    }

    pub fn warn(&self, message: impl Into<String>, payload: Option<Value>) {
        self.record(LogLevel::Warn, message.into(), payload);
    }

    pub fn error(&self, message: impl Into<String>, payload: Option<Value>) {
        self.record(LogLevel::Error, message.into(), payload);
    }

    fn record(&self, level: LogLevel, message: String, payload: Option<Value>) {
        let rendered = payload.as_ref().map(Value::to_string).unwrap_or_default();
        match level {
            LogLevel::Info => tracing::info!(payload = %rendered, "{message}"),
            LogLevel::Warn => tracing::warn!(payload = %rendered, "{message}"),
            LogLevel::Error => tracing::error!(payload = %rendered, "{message}"),
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message,
            payload,
        };
        let mut guard = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.push(entry);
    }

    /// The most recent `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let guard = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let skip = guard.len().saturating_sub(limit);
        guard.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Finalized run summaries in chronological order.
#[derive(Debug, Clone)]
pub struct RunHistory {
    runs: BoundedBuffer<RunSummary>,
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl RunHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            runs: BoundedBuffer::new(capacity),
        }
    }

    pub fn push(&mut self, summary: RunSummary) {
        self.runs.push(summary);
    }

    /// The most recent `limit` summaries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<RunSummary> {
        self.runs.iter().rev().take(limit).cloned().collect()
    }

    pub fn find(&self, run_id: &str) -> Option<RunSummary> {
        self.runs
            .iter()
            .rev()
            .find(|summary| summary.id.0 == run_id)
            .cloned()
    }

    pub fn latest(&self) -> Option<&RunSummary> {
        self.runs.last()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::review::orchestrator::{RunId, RunStatus, RunTotals, RunTrigger};

    fn summary(seq: u32) -> RunSummary {
        RunSummary {
            id: RunId(format!("run-{seq}")),
            status: RunStatus::Completed,
            trigger: RunTrigger::Manual,
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            totals: RunTotals::default(),
            error: None,
        }
    }

    #[test]
    fn bounded_buffer_evicts_oldest_first() {
        let mut buffer = BoundedBuffer::new(3);
        for value in 1..=4 {
            buffer.push(value);
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut buffer = BoundedBuffer::new(0);
        buffer.push("a");
        buffer.push("b");
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.last(), Some(&"b"));
    }

    #[test]
    fn journal_keeps_newest_entries_in_insertion_order() {
        let journal = Journal::with_capacity(5);
        for index in 0..6 {
            journal.info(format!("event {index}"), None);
        }

        let entries = journal.recent(10);
        assert_eq!(entries.len(), 5);
        assert_eq!(entries.first().map(|e| e.message.as_str()), Some("event 1"));
        assert_eq!(entries.last().map(|e| e.message.as_str()), Some("event 5"));
        assert!(!entries.iter().any(|entry| entry.message == "event 0"));
    }

    #[test]
    fn journal_recent_limits_to_latest_entries() {
        let journal = Journal::with_capacity(10);
        journal.info("first", None);
        journal.warn("second", Some(serde_json::json!({ "attempt": 1 })));
        journal.error("third", None);

        let entries = journal.recent(2);
        let levels: Vec<_> = entries.iter().map(|entry| entry.level).collect();
        assert_eq!(levels, vec![LogLevel::Warn, LogLevel::Error]);
        assert_eq!(entries[0].payload, Some(serde_json::json!({ "attempt": 1 })));
    }

    #[test]
    fn history_returns_newest_first_and_evicts_oldest() {
        let mut history = RunHistory::with_capacity(3);
        for seq in 1..=4 {
            history.push(summary(seq));
        }

        let ids: Vec<_> = history.recent(10).into_iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec!["run-4", "run-3", "run-2"]);
        assert!(history.find("run-1").is_none());
        assert_eq!(history.latest().map(|s| s.id.0.as_str()), Some("run-4"));
    }
}
