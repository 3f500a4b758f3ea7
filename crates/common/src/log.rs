//! Bounded run log
//!
//! Keeps the most recent lines reported for a run. The buffer never grows
//! past its capacity: appending to a full buffer evicts the oldest entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of retained entries
pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// Default upper bound for a single line, in bytes
pub const DEFAULT_MAX_LINE_BYTES: usize = 4096;

const TRUNCATION_MARK: &str = "…";

/// Presentation hint for a log line
///
/// Derived from keywords in the text. It only drives colouring and carries
/// no meaning for the run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogClass {
    Info,
    Error,
    Pass,
    Phase,
}

impl LogClass {
    /// Classify a free-form line
    pub fn classify(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        if lower.contains("error") || lower.contains("fail") {
            LogClass::Error
        } else if lower.contains("passed") {
            LogClass::Pass
        } else {
            LogClass::Info
        }
    }
}

/// A single retained log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub text: String,
    pub sequence_no: u64,
    pub class: LogClass,
    pub received_at: DateTime<Utc>,
}

/// Fixed-capacity FIFO of log entries
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    max_line_bytes: usize,
    next_sequence: u64,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        Self::with_line_limit(capacity, DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_line_limit(capacity: usize, max_line_bytes: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            max_line_bytes: max_line_bytes.max(TRUNCATION_MARK.len() + 1),
            next_sequence: 1,
        }
    }

    /// Record a new line, assigning the next sequence number.
    ///
    /// Returns a copy of the stored entry.
    pub fn record(&mut self, text: impl Into<String>, class: LogClass) -> LogEntry {
        let mut text = text.into();
        truncate_line(&mut text, self.max_line_bytes);
        let entry = LogEntry {
            text,
            sequence_no: self.next_sequence,
            class,
            received_at: Utc::now(),
        };
        self.append(entry.clone());
        entry
    }

    /// Append an entry, truncating oversize text and evicting the oldest
    /// entries when the buffer is full.
    pub fn append(&mut self, mut entry: LogEntry) {
        truncate_line(&mut entry.text, self.max_line_bytes);
        self.next_sequence = self.next_sequence.max(entry.sequence_no.saturating_add(1));

        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Ordered copy of the retained entries, oldest first
    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
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
}

/// Cut `text` down to at most `max_bytes`, ending on a char boundary.
fn truncate_line(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes - TRUNCATION_MARK.len();
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(TRUNCATION_MARK);
}
