//! Side channel for relayed chat lines.
//!
//! The router hands every broadcast and private message it delivers to a
//! `ChatLog`. The server binary logs them through `tracing`; tests use
//! `MemoryLog` to assert on what was relayed without any real I/O.

use std::sync::{Arc, Mutex};

use tracing::info;

/// Append-only sink for relayed chat lines.
pub trait ChatLog: Send + Sync {
    fn record(&self, line: &str);
}

/// Shared sink as held by the router.
pub type SharedChatLog = Arc<dyn ChatLog>;

/// Emits each line as an `info` event on the `parlor::chat` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl ChatLog for TracingLog {
    fn record(&self, line: &str) {
        info!(target: "parlor::chat", "{line}");
    }
}

/// Keeps every recorded line in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl ChatLog for MemoryLog {
    fn record(&self, line: &str) {
        let mut lines = self
            .lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        lines.push(line.to_string());
    }
}
