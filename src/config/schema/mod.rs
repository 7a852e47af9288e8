use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`           : printed normally via `&self.field_name`
/// - `redact(field_name)`   : `String` field: shows `[empty]` or `[REDACTED]`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

// Submodules: declared after the macro so they can use `redact_debug!`
mod display;
mod pipeline;
mod twilio;

pub use display::*;
pub use pipeline::*;
pub use twilio::*;

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Status surface
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Locations of the policy lists and persisted state.
///
/// Empty values resolve relative to the marquee home directory.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathsConfig {
    #[serde(default)]
    pub blacklist: String,
    #[serde(default)]
    pub whitelist: String,
    #[serde(default, rename = "blockedPhones")]
    pub blocked_phones: String,
    #[serde(default, rename = "stateDir")]
    pub state_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub blacklist: PathBuf,
    pub whitelist: PathBuf,
    pub blocked_phones: PathBuf,
    pub state_dir: PathBuf,
}

impl ResolvedPaths {
    pub fn cursor_file(&self) -> PathBuf {
        self.state_dir.join("cursor.json")
    }

    pub fn seen_file(&self) -> PathBuf {
        self.state_dir.join("seen_messages.json")
    }

    pub fn ledger_file(&self) -> PathBuf {
        self.state_dir.join("rate_ledger.json")
    }

    pub fn message_log_file(&self) -> PathBuf {
        self.state_dir.join("received_messages.json")
    }
}

impl PathsConfig {
    pub fn resolve(&self, home: &Path) -> ResolvedPaths {
        let pick = |value: &str, fallback: &str| {
            if value.is_empty() {
                home.join(fallback)
            } else {
                crate::utils::expand_home(value)
            }
        };
        ResolvedPaths {
            blacklist: pick(&self.blacklist, "blacklist.txt"),
            whitelist: pick(&self.whitelist, "whitelist.txt"),
            blocked_phones: pick(&self.blocked_phones, "blocked_phones.json"),
            state_dir: pick(&self.state_dir, "state"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Master switch: when false the poller and display loop are not started.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub responses: ResponsesConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), crate::errors::MarqueeError> {
        self.validate_twilio()?;
        self.validate_display()?;
        self.validate_filter()?;
        self.validate_queue()?;
        self.validate_polling()?;
        self.validate_status()?;
        Ok(())
    }

    fn validate_twilio(&self) -> Result<(), crate::errors::MarqueeError> {
        use crate::errors::MarqueeError;
        let tw = &self.twilio;

        if self.enabled {
            if tw.account_sid.is_empty() {
                return Err(MarqueeError::Config(
                    "twilio.accountSid is required when marquee is enabled".into(),
                ));
            }
            if tw.auth_token.is_empty() {
                return Err(MarqueeError::Config(
                    "twilio.authToken is required when marquee is enabled".into(),
                ));
            }
            if tw.phone_number.is_empty() {
                return Err(MarqueeError::Config(
                    "twilio.phoneNumber is required when marquee is enabled".into(),
                ));
            }
        }
        if url::Url::parse(&tw.api_base_url).is_err() {
            return Err(MarqueeError::Config(format!(
                "twilio.apiBaseUrl is not a valid URL: {}",
                tw.api_base_url
            )));
        }
        if tw.timeout_secs == 0 {
            return Err(MarqueeError::Config(
                "twilio.timeoutSecs must be > 0".into(),
            ));
        }
        if tw.page_size == 0 || tw.page_size > 1000 {
            return Err(MarqueeError::Config(
                "twilio.pageSize must be between 1 and 1000".into(),
            ));
        }
        if tw.lookback_mins == 0 {
            return Err(MarqueeError::Config(
                "twilio.lookbackMins must be > 0".into(),
            ));
        }
        let retention_mins = u64::from(self.dedup.retention_days) * 24 * 60;
        if retention_mins > 0 && retention_mins <= tw.lookback_mins {
            return Err(MarqueeError::Config(
                "dedup.retentionDays must cover more than twilio.lookbackMins".into(),
            ));
        }
        Ok(())
    }

    fn validate_display(&self) -> Result<(), crate::errors::MarqueeError> {
        use crate::errors::MarqueeError;
        let d = &self.display;

        if d.duration_secs == 0 {
            return Err(MarqueeError::Config(
                "display.durationSecs must be > 0".into(),
            ));
        }
        if d.trigger_timeout_secs == 0 {
            return Err(MarqueeError::Config(
                "display.triggerTimeoutSecs must be > 0".into(),
            ));
        }
        if !d.name_display_playlist.trim().is_empty() {
            let settle = crate::display::fpp::STOP_SETTLE
                + std::time::Duration::from_millis(d.playlist_settle_ms);
            if std::time::Duration::from_secs(d.trigger_timeout_secs) <= settle {
                return Err(MarqueeError::Config(format!(
                    "display.triggerTimeoutSecs ({}s) must exceed the playlist settle time ({}ms)",
                    d.trigger_timeout_secs,
                    settle.as_millis()
                )));
            }
        }
        if url::Url::parse(&d.fpp_host).is_err() {
            return Err(MarqueeError::Config(format!(
                "display.fppHost is not a valid URL: {}",
                d.fpp_host
            )));
        }
        if !d.message_template.contains("{name}") {
            warn!("display.messageTemplate has no {{name}} placeholder; every show will look the same");
        }
        if d.duration_secs > 600 {
            warn!("display.durationSecs is very long (> 600s), the queue will drain slowly");
        }
        Ok(())
    }

    fn validate_filter(&self) -> Result<(), crate::errors::MarqueeError> {
        use crate::errors::MarqueeError;
        let f = &self.filter;

        if f.max_message_length == 0 {
            return Err(MarqueeError::Config(
                "filter.maxMessageLength must be > 0".into(),
            ));
        }
        if f.fallback_name.trim().is_empty() {
            return Err(MarqueeError::Config(
                "filter.fallbackName must not be empty".into(),
            ));
        }
        if f.max_messages_per_phone == 0 {
            warn!("filter.maxMessagesPerPhone is 0: per-phone rate limiting is disabled");
        }
        Ok(())
    }

    fn validate_queue(&self) -> Result<(), crate::errors::MarqueeError> {
        use crate::errors::MarqueeError;

        if self.queue.capacity == 0 {
            return Err(MarqueeError::Config("queue.capacity must be > 0".into()));
        }
        if self.queue.capacity > 100_000 {
            return Err(MarqueeError::Config(
                "queue.capacity is unreasonably large (> 100,000)".into(),
            ));
        }
        Ok(())
    }

    fn validate_polling(&self) -> Result<(), crate::errors::MarqueeError> {
        use crate::errors::MarqueeError;
        let p = &self.polling;

        if p.interval_secs == 0 {
            return Err(MarqueeError::Config(
                "polling.intervalSecs must be > 0".into(),
            ));
        }
        if p.max_backoff_secs < p.interval_secs {
            return Err(MarqueeError::Config(
                "polling.maxBackoffSecs must be >= polling.intervalSecs".into(),
            ));
        }
        if self.responses.enabled && self.responses.worker_capacity == 0 {
            return Err(MarqueeError::Config(
                "responses.workerCapacity must be > 0 when responses are enabled".into(),
            ));
        }
        Ok(())
    }

    fn validate_status(&self) -> Result<(), crate::errors::MarqueeError> {
        use crate::errors::MarqueeError;

        if self.status.enabled && self.status.port == 0 {
            return Err(MarqueeError::Config("status.port must be > 0".into()));
        }
        if self.status.enabled && self.status.port < 1024 {
            warn!(
                "status.port {} is a privileged port (< 1024), may require elevated permissions",
                self.status.port
            );
        }
        Ok(())
    }
}
