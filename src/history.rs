// Event history: one human-readable line per accepted transition.
//
// The rest of the application consumes these lines for later display; the
// engine only produces them. Timeout-driven resolutions read the same as
// captain resolutions in the state snapshot, so the history line is where
// the "automatic" distinction lives.

use chrono::{DateTime, Utc};
use tracing::info;

/// A single history entry: wall-clock timestamp plus display line.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub line: String,
}

impl HistoryEntry {
    pub fn now(line: impl Into<String>) -> Self {
        HistoryEntry {
            at: Utc::now(),
            line: line.into(),
        }
    }
}

/// Sink for history entries. The session actor owns one per draft.
pub trait EventSink: Send {
    fn record(&mut self, entry: HistoryEntry);
}

/// Production sink: forwards entries to the tracing pipeline under a
/// dedicated target so deployments can route/filter draft history lines.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&mut self, entry: HistoryEntry) {
        info!(target: "herodraft::history", "{}", entry.line);
    }
}

/// Test sink: collects entries in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub entries: Vec<HistoryEntry>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.line.as_str()).collect()
    }
}

impl EventSink for MemorySink {
    fn record(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }
}
