use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

fn default_max_messages_per_phone() -> u32 {
    5
}

fn default_max_message_length() -> usize {
    40
}

fn default_max_message_age_mins() -> u64 {
    5
}

fn default_fallback_name() -> String {
    "Guest".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Accepted messages per phone per calendar day; 0 disables the limit.
    #[serde(
        default = "default_max_messages_per_phone",
        rename = "maxMessagesPerPhone"
    )]
    pub max_messages_per_phone: u32,
    /// Extracted names are cut to this many characters.
    #[serde(default = "default_max_message_length", rename = "maxMessageLength")]
    pub max_message_length: usize,
    #[serde(default, rename = "oneWordOnly")]
    pub one_word_only: bool,
    #[serde(default = "super::default_true", rename = "twoWordsMax")]
    pub two_words_max: bool,
    #[serde(default, rename = "useWhitelist")]
    pub use_whitelist: bool,
    #[serde(default = "super::default_true", rename = "profanityFilter")]
    pub profanity_filter: bool,
    /// Reject the same name from the same phone twice in one day.
    #[serde(default = "super::default_true", rename = "rejectDuplicateNames")]
    pub reject_duplicate_names: bool,
    /// Messages older than this are skipped silently; 0 disables the cutoff.
    #[serde(
        default = "default_max_message_age_mins",
        rename = "maxMessageAgeMins"
    )]
    pub max_message_age_mins: u64,
    /// Shown when nothing usable is left after cleaning the body.
    #[serde(default = "default_fallback_name", rename = "fallbackName")]
    pub fallback_name: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_messages_per_phone: default_max_messages_per_phone(),
            max_message_length: default_max_message_length(),
            one_word_only: false,
            two_words_max: true,
            use_whitelist: false,
            profanity_filter: true,
            reject_duplicate_names: true,
            max_message_age_mins: default_max_message_age_mins(),
            fallback_name: default_fallback_name(),
        }
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

fn default_queue_capacity() -> usize {
    100
}

/// What happens when a request arrives at a full display queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum OverflowPolicy {
    /// Refuse the new arrival; everything already queued keeps its place.
    #[default]
    RejectNewest,
    /// Evict the oldest queued request to make room.
    DropOldest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    #[serde(default, rename = "overflowPolicy")]
    pub overflow_policy: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

fn default_interval_secs() -> u64 {
    2
}

fn default_max_backoff_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_secs", rename = "intervalSecs")]
    pub interval_secs: u64,
    /// With no saved cursor, treat whatever the provider already holds as seen.
    #[serde(default = "super::default_true", rename = "skipBacklogOnFirstRun")]
    pub skip_backlog_on_first_run: bool,
    /// Ceiling for the delay between ticks after repeated fetch failures.
    #[serde(default = "default_max_backoff_secs", rename = "maxBackoffSecs")]
    pub max_backoff_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            skip_backlog_on_first_run: true,
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// SMS responses
// ---------------------------------------------------------------------------

fn default_response_success() -> String {
    "Thanks! Your name will appear on our display soon!".to_string()
}

fn default_response_profanity() -> String {
    "Sorry, your message contains inappropriate content and cannot be displayed.".to_string()
}

fn default_response_blocked() -> String {
    "You have been blocked from sending messages.".to_string()
}

fn default_response_rate_limited() -> String {
    "You've reached the maximum number of messages allowed. Please try again tomorrow!"
        .to_string()
}

fn default_response_duplicate() -> String {
    "You've already sent this name today!".to_string()
}

fn default_response_invalid_format() -> String {
    "Please send only a name (1-2 words, no sentences).".to_string()
}

fn default_response_not_whitelisted() -> String {
    "Sorry, that name is not on our approved list.".to_string()
}

fn default_response_queue_full() -> String {
    "Our display queue is full right now. Please try again in a few minutes.".to_string()
}

fn default_worker_capacity() -> usize {
    32
}

/// Reply templates keyed by verdict reason. An empty template sends nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_response_success")]
    pub success: String,
    #[serde(default = "default_response_profanity")]
    pub profanity: String,
    #[serde(default = "default_response_blocked")]
    pub blocked: String,
    #[serde(default = "default_response_rate_limited", rename = "rateLimited")]
    pub rate_limited: String,
    #[serde(default = "default_response_duplicate")]
    pub duplicate: String,
    #[serde(default = "default_response_invalid_format", rename = "invalidFormat")]
    pub invalid_format: String,
    #[serde(
        default = "default_response_not_whitelisted",
        rename = "notWhitelisted"
    )]
    pub not_whitelisted: String,
    #[serde(default = "default_response_queue_full", rename = "queueFull")]
    pub queue_full: String,
    /// Replies waiting for the send worker before new ones are dropped.
    #[serde(default = "default_worker_capacity", rename = "workerCapacity")]
    pub worker_capacity: usize,
}

impl Default for ResponsesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            success: default_response_success(),
            profanity: default_response_profanity(),
            blocked: default_response_blocked(),
            rate_limited: default_response_rate_limited(),
            duplicate: default_response_duplicate(),
            invalid_format: default_response_invalid_format(),
            not_whitelisted: default_response_not_whitelisted(),
            queue_full: default_response_queue_full(),
            worker_capacity: default_worker_capacity(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dedup
// ---------------------------------------------------------------------------

fn default_retention_days() -> u32 {
    7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Seen ids older than this are forgotten; 0 keeps them forever.
    #[serde(default = "default_retention_days", rename = "retentionDays")]
    pub retention_days: u32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}
