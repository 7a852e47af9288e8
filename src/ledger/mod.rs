//! Per-phone, per-day accepted message counts.
//!
//! The check against the daily limit and the increment happen under one
//! lock, so two evaluations for the same phone cannot both slip under it.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct PhoneDay {
    date: NaiveDate,
    count: u32,
    /// Lower-cased names accepted on `date`.
    #[serde(default)]
    names: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerData {
    phones: HashMap<String, PhoneDay>,
}

/// Result of an atomic check-and-record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Counted; carries the phone's new total for the day.
    Recorded(u32),
    RateLimited,
    Duplicate,
}

pub struct RateLedger {
    phones: Mutex<HashMap<String, PhoneDay>>,
    path: Option<PathBuf>,
}

impl RateLedger {
    pub fn in_memory() -> Self {
        Self {
            phones: Mutex::new(HashMap::new()),
            path: None,
        }
    }

    /// Open a ledger persisted at `path`. A corrupt file starts an empty ledger.
    pub fn open(path: &Path) -> Result<Self> {
        let phones = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read rate ledger {}", path.display()))?;
            match serde_json::from_str::<LedgerData>(&content) {
                Ok(data) => data.phones,
                Err(e) => {
                    warn!("rate ledger {} is corrupt, starting fresh: {}", path.display(), e);
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };
        debug!("rate ledger loaded with {} phones", phones.len());
        Ok(Self {
            phones: Mutex::new(phones),
            path: Some(path.to_path_buf()),
        })
    }

    /// Messages accepted from `phone` on `day`. A stale date counts as zero.
    pub fn count(&self, phone: &str, day: NaiveDate) -> u32 {
        let phones = self.phones.lock().unwrap_or_else(PoisonError::into_inner);
        phones
            .get(phone)
            .filter(|entry| entry.date == day)
            .map_or(0, |entry| entry.count)
    }

    pub fn has_name(&self, phone: &str, day: NaiveDate, name: &str) -> bool {
        let key = name.to_lowercase();
        let phones = self.phones.lock().unwrap_or_else(PoisonError::into_inner);
        phones
            .get(phone)
            .filter(|entry| entry.date == day)
            .is_some_and(|entry| entry.names.contains(&key))
    }

    /// Re-check the limit (0 means unlimited) and duplicate rule, then count
    /// the message, all under one lock.
    pub fn try_record(
        &self,
        phone: &str,
        day: NaiveDate,
        name: &str,
        limit: u32,
        reject_duplicates: bool,
    ) -> RecordOutcome {
        let key = name.to_lowercase();
        let mut phones = self.phones.lock().unwrap_or_else(PoisonError::into_inner);
        phones.retain(|_, entry| entry.date >= day);

        let entry = phones.entry(phone.to_string()).or_insert_with(|| PhoneDay {
            date: day,
            count: 0,
            names: Vec::new(),
        });
        if entry.date != day {
            *entry = PhoneDay {
                date: day,
                count: 0,
                names: Vec::new(),
            };
        }
        if limit > 0 && entry.count >= limit {
            return RecordOutcome::RateLimited;
        }
        if reject_duplicates && entry.names.contains(&key) {
            return RecordOutcome::Duplicate;
        }
        entry.count += 1;
        if !entry.names.contains(&key) {
            entry.names.push(key);
        }
        let total = entry.count;
        self.persist(&phones);
        RecordOutcome::Recorded(total)
    }

    /// Give back a recorded message, e.g. when the display queue refused it.
    pub fn release(&self, phone: &str, day: NaiveDate, name: &str) {
        let key = name.to_lowercase();
        let mut phones = self.phones.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = phones.get_mut(phone) else {
            return;
        };
        if entry.date != day || entry.count == 0 {
            return;
        }
        entry.count -= 1;
        entry.names.retain(|n| *n != key);
        self.persist(&phones);
    }

    fn persist(&self, phones: &HashMap<String, PhoneDay>) {
        let Some(path) = &self.path else {
            return;
        };
        let data = LedgerData {
            phones: phones.clone(),
        };
        let result = serde_json::to_string(&data)
            .map_err(anyhow::Error::from)
            .and_then(|content| crate::utils::atomic_write(path, &content));
        if let Err(e) = result {
            warn!("failed to persist rate ledger: {:#}", e);
        }
    }
}
