//! Cached blacklist, whitelist and blocked-phone lists.
//!
//! Each list is backed by a [`PolicySource`] and held as an immutable
//! snapshot (`Arc<HashSet<String>>`). A reload compares the source's version
//! against the cached one; file I/O happens outside the lock and the write
//! lock is only taken to swap the new snapshot in.

use crate::errors::MarqueeError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Backing artifact of one policy list.
pub trait PolicySource: Send + Sync {
    fn name(&self) -> String;

    /// Modification stamp of the artifact, `None` when it does not exist.
    fn version(&self) -> Result<Option<SystemTime>>;

    fn read(&self) -> Result<String>;

    fn write(&self, _content: &str) -> Result<()> {
        anyhow::bail!("policy source '{}' is read-only", self.name())
    }
}

/// A policy list stored in a plain file.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PolicySource for FileSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn version(&self) -> Result<Option<SystemTime>> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(meta.modified().with_context(|| {
                format!("no modification time for {}", self.path.display())
            })?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("failed to stat {}", self.path.display()))
            }
        }
    }

    fn read(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))
    }

    fn write(&self, content: &str) -> Result<()> {
        use fs2::FileExt;
        let lock_path = self.path.with_extension("lock");
        if let Some(parent) = lock_path.parent() {
            crate::utils::ensure_dir(parent)?;
        }
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)
            .with_context(|| format!("failed to open {}", lock_path.display()))?;
        lock_file
            .lock_exclusive()
            .with_context(|| "failed to acquire policy lock")?;
        crate::utils::atomic_write(&self.path, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Blacklist,
    Whitelist,
    BlockedPhones,
}

impl ListKind {
    fn parse(self, content: &str) -> Result<HashSet<String>> {
        match self {
            Self::Blacklist | Self::Whitelist => Ok(content
                .lines()
                .map(normalize)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .collect()),
            Self::BlockedPhones => {
                if content.trim().is_empty() {
                    return Ok(HashSet::new());
                }
                let phones: Vec<String> = serde_json::from_str(content)
                    .with_context(|| "blocked phones must be a JSON array of strings")?;
                Ok(phones
                    .iter()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect())
            }
        }
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blacklist => write!(f, "blacklist"),
            Self::Whitelist => write!(f, "whitelist"),
            Self::BlockedPhones => write!(f, "blocked phones"),
        }
    }
}

/// Lower-case, trim and collapse inner whitespace.
pub fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Blacklist entries carrying symbols (`f-ing`, `a$$`) that tokenizing would
/// split apart, each compiled to match only between non-word characters.
fn symbol_patterns(entries: &HashSet<String>) -> Vec<(String, Regex)> {
    entries
        .iter()
        .filter(|entry| !entry.contains(' ') && tokenize(entry).join(" ") != **entry)
        .filter_map(|entry| {
            let pattern = format!(r"(?:^|\W){}(?:$|\W)", regex::escape(entry));
            match Regex::new(&pattern) {
                Ok(re) => Some((entry.clone(), re)),
                Err(e) => {
                    warn!("skipping blacklist entry '{}': {}", entry, e);
                    None
                }
            }
        })
        .collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Availability {
    Unknown,
    Available,
    Missing,
    Unreadable,
}

struct CachedList {
    entries: Arc<HashSet<String>>,
    patterns: Arc<Vec<(String, Regex)>>,
    version: Option<SystemTime>,
    loaded: bool,
    loaded_at: Option<DateTime<Utc>>,
    state: Availability,
}

impl Default for CachedList {
    fn default() -> Self {
        Self {
            entries: Arc::new(HashSet::new()),
            patterns: Arc::new(Vec::new()),
            version: None,
            loaded: false,
            loaded_at: None,
            state: Availability::Unknown,
        }
    }
}

struct ListSlot {
    kind: ListKind,
    source: Box<dyn PolicySource>,
    cache: RwLock<CachedList>,
    write_guard: Mutex<()>,
}

impl ListSlot {
    fn new(kind: ListKind, source: Box<dyn PolicySource>) -> Self {
        Self {
            kind,
            source,
            cache: RwLock::new(CachedList::default()),
            write_guard: Mutex::new(()),
        }
    }

    fn snapshot(&self) -> Arc<HashSet<String>> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if cache.loaded {
                return Arc::clone(&cache.entries);
            }
        }
        self.refresh();
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&cache.entries)
    }

    fn patterns(&self) -> Arc<Vec<(String, Regex)>> {
        self.snapshot();
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&cache.patterns)
    }

    /// Re-read the source when its version moved. Returns true on a swap.
    fn refresh(&self) -> bool {
        let version = self.source.version();
        if let Ok(current) = &version {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if cache.loaded && cache.version == *current {
                return false;
            }
        }

        let outcome = version.and_then(|current| match current {
            None => Ok((HashSet::new(), None)),
            Some(stamp) => {
                let content = self.source.read()?;
                Ok((self.kind.parse(&content)?, Some(stamp)))
            }
        });

        let outcome = outcome.map(|(entries, stamp)| {
            let patterns = if self.kind == ListKind::Blacklist {
                symbol_patterns(&entries)
            } else {
                Vec::new()
            };
            (entries, patterns, stamp)
        });

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok((entries, patterns, stamp)) => {
                let next = if stamp.is_some() {
                    Availability::Available
                } else {
                    Availability::Missing
                };
                if next != cache.state {
                    self.log_transition(&next, None);
                }
                debug!("loaded {} {} entries", entries.len(), self.kind);
                cache.entries = Arc::new(entries);
                cache.patterns = Arc::new(patterns);
                cache.version = stamp;
                cache.loaded = true;
                cache.loaded_at = Some(Utc::now());
                cache.state = next;
                true
            }
            Err(e) => {
                if cache.state != Availability::Unreadable {
                    self.log_transition(&Availability::Unreadable, Some(&e));
                }
                // keep the last good snapshot; an empty one if nothing ever loaded
                cache.loaded = true;
                cache.state = Availability::Unreadable;
                false
            }
        }
    }

    fn log_transition(&self, next: &Availability, err: Option<&anyhow::Error>) {
        match next {
            Availability::Available => {
                info!("{} source {} is available", self.kind, self.source.name());
            }
            Availability::Missing => {
                let err = MarqueeError::PolicySourceUnavailable {
                    source_name: self.source.name(),
                    message: format!("not found, {} treated as empty", self.kind),
                };
                if self.kind == ListKind::BlockedPhones {
                    info!("{}", err);
                } else {
                    warn!("{}", err);
                }
            }
            Availability::Unreadable => {
                let err = MarqueeError::PolicySourceUnavailable {
                    source_name: self.source.name(),
                    message: err.map_or_else(|| "unreadable".to_string(), |e| format!("{e:#}")),
                };
                warn!("{}; keeping last loaded {}", err, self.kind);
            }
            Availability::Unknown => {}
        }
    }

    fn freshness(&self) -> PolicyFreshness {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        PolicyFreshness {
            list: self.kind,
            source: self.source.name(),
            entries: cache.entries.len(),
            available: cache.state == Availability::Available,
            modified_at: cache.version.map(DateTime::<Utc>::from),
            loaded_at: cache.loaded_at,
        }
    }
}

/// Cache metadata for one list, reported on the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyFreshness {
    pub list: ListKind,
    pub source: String,
    pub entries: usize,
    pub available: bool,
    pub modified_at: Option<DateTime<Utc>>,
    pub loaded_at: Option<DateTime<Utc>>,
}

pub struct PolicyStore {
    blacklist: ListSlot,
    whitelist: ListSlot,
    blocked_phones: ListSlot,
}

impl PolicyStore {
    pub fn new(
        blacklist: Box<dyn PolicySource>,
        whitelist: Box<dyn PolicySource>,
        blocked_phones: Box<dyn PolicySource>,
    ) -> Self {
        Self {
            blacklist: ListSlot::new(ListKind::Blacklist, blacklist),
            whitelist: ListSlot::new(ListKind::Whitelist, whitelist),
            blocked_phones: ListSlot::new(ListKind::BlockedPhones, blocked_phones),
        }
    }

    pub fn from_paths(paths: &crate::config::ResolvedPaths) -> Self {
        Self::new(
            Box::new(FileSource::new(&paths.blacklist)),
            Box::new(FileSource::new(&paths.whitelist)),
            Box::new(FileSource::new(&paths.blocked_phones)),
        )
    }

    /// Reload every list whose source changed since it was cached.
    pub fn reload_if_changed(&self) {
        for slot in self.slots() {
            if slot.refresh() {
                debug!("{} cache refreshed", slot.kind);
            }
        }
    }

    pub fn is_blacklisted(&self, word: &str) -> bool {
        self.blacklist.snapshot().contains(&normalize(word))
    }

    pub fn is_whitelisted(&self, name: &str) -> bool {
        self.whitelist.snapshot().contains(&normalize(name))
    }

    pub fn is_phone_blocked(&self, phone: &str) -> bool {
        self.blocked_phones.snapshot().contains(phone.trim())
    }

    pub fn whitelist_is_empty(&self) -> bool {
        self.whitelist.snapshot().is_empty()
    }

    pub fn blacklist_is_empty(&self) -> bool {
        self.blacklist.snapshot().is_empty()
    }

    /// First blacklist entry found as a whole word (or phrase) in `text`.
    pub fn find_blacklisted(&self, text: &str) -> Option<String> {
        let words = self.blacklist.snapshot();
        if words.is_empty() {
            return None;
        }
        let tokens = tokenize(text);
        if let Some(hit) = tokens.iter().find(|t| words.contains(*t)) {
            return Some(hit.clone());
        }
        let joined = format!(" {} ", tokens.join(" "));
        if let Some(phrase) = words
            .iter()
            .filter(|entry| entry.contains(' '))
            .find(|entry| joined.contains(&format!(" {} ", tokenize(entry).join(" "))))
        {
            return Some(phrase.clone());
        }
        let lowered = text.to_lowercase();
        self.blacklist
            .patterns()
            .iter()
            .find(|(_, re)| re.is_match(&lowered))
            .map(|(entry, _)| entry.clone())
    }

    pub fn blocked_phones(&self) -> Vec<String> {
        let mut phones: Vec<String> = self.blocked_phones.snapshot().iter().cloned().collect();
        phones.sort();
        phones
    }

    /// Add a phone to the blocklist. Returns false if it was already blocked.
    pub fn block_phone(&self, phone: &str) -> Result<bool> {
        self.update_blocklist(phone, true)
    }

    /// Remove a phone from the blocklist. Returns false if it was not blocked.
    pub fn unblock_phone(&self, phone: &str) -> Result<bool> {
        self.update_blocklist(phone, false)
    }

    fn update_blocklist(&self, phone: &str, block: bool) -> Result<bool> {
        let phone = phone.trim();
        if phone.is_empty() {
            anyhow::bail!("phone number must not be empty");
        }
        let slot = &self.blocked_phones;
        let _guard = slot
            .write_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slot.refresh();

        let mut entries = (*slot.snapshot()).clone();
        let changed = if block {
            entries.insert(phone.to_string())
        } else {
            entries.remove(phone)
        };
        if !changed {
            return Ok(false);
        }

        let mut sorted: Vec<&String> = entries.iter().collect();
        sorted.sort();
        let content = serde_json::to_string_pretty(&sorted)?;
        slot.source.write(&content)?;
        let stamp = slot.source.version().unwrap_or(None);

        let mut cache = slot.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.entries = Arc::new(entries);
        cache.version = stamp;
        cache.loaded = true;
        cache.loaded_at = Some(Utc::now());
        cache.state = Availability::Available;
        drop(cache);

        let masked = crate::utils::mask_phone(phone);
        if block {
            info!("blocked phone {}", masked);
        } else {
            info!("unblocked phone {}", masked);
        }
        Ok(true)
    }

    pub fn freshness(&self) -> Vec<PolicyFreshness> {
        self.slots().iter().map(|slot| slot.freshness()).collect()
    }

    fn slots(&self) -> [&ListSlot; 3] {
        [&self.blacklist, &self.whitelist, &self.blocked_phones]
    }
}
