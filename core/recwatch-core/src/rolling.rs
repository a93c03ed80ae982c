//! Shared diagnostic log: capacity-bounded, newest-first, lossy by design.
//!
//! Every component reports user-visible events here; `tracing` stays the
//! developer channel. Appends come from any producer thread. When the log
//! is full the oldest entry is dropped - this is a live diagnostic view,
//! not an audit trail.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Entries kept before the oldest is dropped.
pub const DEFAULT_LOG_CAPACITY: usize = 50;

/// Source tag rendered in front of every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    Error,
    Success,
    MediaRecorder,
    AudioRecord,
    LegacyCamera,
    ModernCamera,
    System,
    Permission,
    Callback,
    Info,
}

impl LogTag {
    pub fn code(self) -> &'static str {
        match self {
            LogTag::Error => "x",
            LogTag::Success => "+",
            LogTag::MediaRecorder => "MR",
            LogTag::AudioRecord => "AR",
            LogTag::LegacyCamera => "CAM",
            LogTag::ModernCamera => "CAM2",
            LogTag::System => "SYS",
            LogTag::Permission => "PERM",
            LogTag::Callback => "CB",
            LogTag::Info => "INFO",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub tag: LogTag,
    pub message: String,
}

impl LogEntry {
    pub fn formatted(&self) -> String {
        format!("[{}] {}", self.tag.code(), self.message)
    }
}

/// Cheaply cloneable handle to the process-wide rolling log.
#[derive(Clone)]
pub struct RollingLog {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl Default for RollingLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// Appends an entry at the front, dropping the oldest past capacity.
    pub fn push(&self, tag: LogTag, message: impl Into<String>) {
        let entry = LogEntry {
            at: Utc::now(),
            tag,
            message: message.into(),
        };
        tracing::debug!(target: "recwatch", "{}", entry.formatted());
        if let Ok(mut entries) = self.entries.lock() {
            entries.push_front(entry);
            entries.truncate(self.capacity);
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogTag::Error, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(LogTag::Success, message);
    }

    pub fn system(&self, message: impl Into<String>) {
        self.push(LogTag::System, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogTag::Info, message);
    }

    pub fn callback(&self, message: impl Into<String>) {
        self.push(LogTag::Callback, message);
    }

    pub fn permission(&self, message: impl Into<String>) {
        self.push(LogTag::Permission, message);
    }

    pub fn legacy_camera(&self, message: impl Into<String>) {
        self.push(LogTag::LegacyCamera, message);
    }

    pub fn modern_camera(&self, message: impl Into<String>) {
        self.push(LogTag::ModernCamera, message);
    }

    pub fn media_recorder(&self, message: impl Into<String>) {
        self.push(LogTag::MediaRecorder, message);
    }

    pub fn audio_record(&self, message: impl Into<String>) {
        self.push(LogTag::AudioRecord, message);
    }

    /// Formatted entries, newest first.
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.iter().map(LogEntry::formatted).collect())
            .unwrap_or_default()
    }

    /// The most recent entry, if any.
    pub fn latest(&self) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.front().map(LogEntry::formatted))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
