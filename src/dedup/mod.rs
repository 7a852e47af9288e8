//! Persisted set of provider message ids already processed.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenData {
    /// id -> first time it was seen
    ids: HashMap<String, DateTime<Utc>>,
}

pub struct Deduplicator {
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
    path: Option<PathBuf>,
    retention: Option<Duration>,
}

impl Deduplicator {
    /// `retention_days == 0` keeps ids forever.
    pub fn in_memory(retention_days: u32) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            path: None,
            retention: Self::retention(retention_days),
        }
    }

    pub fn open(path: &Path, retention_days: u32) -> Result<Self> {
        let ids = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read seen set {}", path.display()))?;
            serde_json::from_str::<SeenData>(&content)
                .with_context(|| format!("seen set {} is corrupt", path.display()))?
                .ids
        } else {
            HashMap::new()
        };
        let dedup = Self {
            seen: Mutex::new(ids),
            path: Some(path.to_path_buf()),
            retention: Self::retention(retention_days),
        };
        let trimmed = dedup.trim_expired(Utc::now());
        debug!("seen set loaded: {} ids ({} expired)", dedup.len(), trimmed);
        Ok(dedup)
    }

    fn retention(days: u32) -> Option<Duration> {
        (days > 0).then(|| Duration::days(i64::from(days)))
    }

    /// True exactly once per id: the check and the insert are one step.
    pub fn is_new(&self, message_id: &str) -> bool {
        self.is_new_at(message_id, Utc::now())
    }

    pub fn is_new_at(&self, message_id: &str, now: DateTime<Utc>) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.contains_key(message_id) {
            return false;
        }
        seen.insert(message_id.to_string(), now);
        self.persist(&seen);
        true
    }

    pub fn contains(&self, message_id: &str) -> bool {
        let seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.contains_key(message_id)
    }

    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget ids first seen before the retention window. Returns how many went.
    pub fn trim_expired(&self, now: DateTime<Utc>) -> usize {
        let Some(retention) = self.retention else {
            return 0;
        };
        let cutoff = now - retention;
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let before = seen.len();
        seen.retain(|_, first_seen| *first_seen >= cutoff);
        let removed = before - seen.len();
        if removed > 0 {
            info!("forgot {} message ids older than {} days", removed, retention.num_days());
            self.persist(&seen);
        }
        removed
    }

    fn persist(&self, seen: &HashMap<String, DateTime<Utc>>) {
        let Some(path) = &self.path else {
            return;
        };
        let data = SeenData { ids: seen.clone() };
        let result = serde_json::to_string(&data)
            .map_err(anyhow::Error::from)
            .and_then(|content| crate::utils::atomic_write(path, &content));
        if let Err(e) = result {
            warn!("failed to persist seen message ids: {:#}", e);
        }
    }
}
