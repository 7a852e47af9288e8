//! Rolling log of received messages and what became of them.

use crate::filter::Reason;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

pub const MAX_LOG_ENTRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Queued,
    Displaying,
    Displayed,
    Blocked,
    RateLimited,
    InvalidFormat,
    Duplicate,
    NotWhitelisted,
    Profanity,
    QueueFull,
    DisplayFailed,
    Dropped,
    Expired,
}

impl From<Reason> for MessageStatus {
    fn from(reason: Reason) -> Self {
        match reason {
            Reason::Accepted => Self::Queued,
            Reason::PhoneBlocked => Self::Blocked,
            Reason::RateLimited => Self::RateLimited,
            Reason::InvalidFormat => Self::InvalidFormat,
            Reason::Duplicate => Self::Duplicate,
            Reason::NotWhitelisted => Self::NotWhitelisted,
            Reason::Profanity => Self::Profanity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message_id: String,
    pub phone: String,
    pub message: String,
    pub extracted_name: String,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_updated: Option<DateTime<Utc>>,
}

impl LogEntry {
    pub fn new(
        message_id: impl Into<String>,
        phone: impl Into<String>,
        message: impl Into<String>,
        extracted_name: impl Into<String>,
        status: MessageStatus,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            message_id: message_id.into(),
            phone: phone.into(),
            message: message.into(),
            extracted_name: extracted_name.into(),
            status,
            status_updated: None,
        }
    }
}

pub struct MessageLog {
    entries: Mutex<VecDeque<LogEntry>>,
    path: Option<PathBuf>,
}

impl MessageLog {
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            path: None,
        }
    }

    /// Load the log at `path`. An unreadable or corrupt log starts empty.
    pub fn open(path: &Path) -> Self {
        let entries = match Self::load(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("message log unusable, starting empty: {:#}", e);
                VecDeque::new()
            }
        };
        Self {
            entries: Mutex::new(entries),
            path: Some(path.to_path_buf()),
        }
    }

    fn load(path: &Path) -> Result<VecDeque<LogEntry>> {
        if !path.exists() {
            return Ok(VecDeque::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut entries: VecDeque<LogEntry> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        while entries.len() > MAX_LOG_ENTRIES {
            entries.pop_front();
        }
        Ok(entries)
    }

    pub fn record(&self, entry: LogEntry) {
        debug!(
            "message log: {} | {} | {:?}",
            crate::utils::mask_phone(&entry.phone),
            entry.extracted_name,
            entry.status
        );
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push_back(entry);
        while entries.len() > MAX_LOG_ENTRIES {
            entries.pop_front();
        }
        self.persist(&entries);
    }

    /// Set the status of the newest entry for `message_id`. False if absent.
    pub fn update_status(&self, message_id: &str, status: MessageStatus) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries
            .iter_mut()
            .rev()
            .find(|e| e.message_id == message_id)
        else {
            return false;
        };
        entry.status = status;
        entry.status_updated = Some(Utc::now());
        self.persist(&entries);
        true
    }

    /// Entries, newest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
        self.persist(&entries);
    }

    fn persist(&self, entries: &VecDeque<LogEntry>) {
        let Some(path) = &self.path else {
            return;
        };
        let result = serde_json::to_string_pretty(entries)
            .map_err(anyhow::Error::from)
            .and_then(|content| crate::utils::atomic_write(path, &content));
        if let Err(e) = result {
            warn!("failed to persist message log: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests;
