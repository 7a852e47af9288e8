//! Periodic fetch of new texts, fed through dedup, filter and queue.

use crate::config::PollingConfig;
use crate::dedup::Deduplicator;
use crate::errors::MarqueeError;
use crate::filter::{MessageFilter, Reason};
use crate::message_log::{LogEntry, MessageLog, MessageStatus};
use crate::policy::PolicyStore;
use crate::provider::{Cursor, InboundMessage, SmsProvider};
use crate::queue::{DisplayQueue, DisplayRequest};
use crate::responder::{ReplyKind, ReplyTemplates, ResponseSender};
use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

const MAX_AGE_CAP_MINS: u64 = 60 * 24 * 365;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Disposition {
    Queued { name: String, position: usize },
    Rejected { reason: Reason, name: String },
    QueueFull { name: String },
    AlreadySeen,
    Expired,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub fetched: usize,
    pub queued: usize,
    pub rejected: usize,
    pub skipped: usize,
    /// True when this tick only recorded the existing backlog.
    pub backlog_skipped: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PollStatus {
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_summary: Option<TickSummary>,
    pub cursor: Cursor,
}

/// Loads and saves the high-water mark.
struct CursorFile {
    path: Option<PathBuf>,
}

impl CursorFile {
    fn load(&self) -> anyhow::Result<Cursor> {
        let Some(path) = &self.path else {
            return Ok(Cursor::default());
        };
        if !path.exists() {
            return Ok(Cursor::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cursor {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("cursor {} is corrupt", path.display()))
    }

    fn save(&self, cursor: &Cursor) {
        let Some(path) = &self.path else {
            return;
        };
        let result = serde_json::to_string_pretty(cursor)
            .map_err(anyhow::Error::from)
            .and_then(|content| crate::utils::atomic_write(path, &content));
        if let Err(e) = result {
            warn!("failed to persist poll cursor: {:#}", e);
        }
    }
}

/// Everything a poller shares with the rest of the service.
pub struct PollerDeps {
    pub provider: Arc<dyn SmsProvider>,
    pub policy: Arc<PolicyStore>,
    pub filter: Arc<MessageFilter>,
    pub dedup: Arc<Deduplicator>,
    pub queue: Arc<DisplayQueue>,
    pub log: Arc<MessageLog>,
    pub templates: ReplyTemplates,
    pub responder: Option<Arc<ResponseSender>>,
}

pub struct InboundPoller {
    deps: PollerDeps,
    config: PollingConfig,
    fetch_timeout: Duration,
    max_age: Option<chrono::Duration>,
    cursor: Mutex<Cursor>,
    cursor_file: CursorFile,
    status: RwLock<PollStatus>,
}

impl InboundPoller {
    /// `cursor_path` of `None` keeps the cursor in memory only.
    pub fn new(
        deps: PollerDeps,
        config: PollingConfig,
        fetch_timeout: Duration,
        cursor_path: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let cursor_file = CursorFile {
            path: cursor_path.map(Path::to_path_buf),
        };
        let cursor = cursor_file.load()?;
        let max_age_mins = deps.filter.config().max_message_age_mins;
        let max_age = (max_age_mins > 0).then(|| {
            let mins = i64::try_from(max_age_mins.min(MAX_AGE_CAP_MINS)).unwrap_or(0);
            chrono::Duration::minutes(mins)
        });
        let status = PollStatus {
            cursor: cursor.clone(),
            ..PollStatus::default()
        };
        Ok(Self {
            deps,
            config,
            fetch_timeout,
            max_age,
            cursor: Mutex::new(cursor),
            cursor_file,
            status: RwLock::new(status),
        })
    }

    pub fn status(&self) -> PollStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch once and process the batch oldest-first.
    pub async fn tick(&self) -> Result<TickSummary, MarqueeError> {
        let now = Utc::now();
        self.deps.policy.reload_if_changed();
        self.deps.dedup.trim_expired(now);

        let mut cursor = self.cursor.lock().await;
        let fetched = tokio::time::timeout(
            self.fetch_timeout,
            self.deps.provider.fetch_messages_since(&cursor),
        )
        .await
        .map_err(|_| MarqueeError::ProviderFetch {
            message: format!("timed out after {}s", self.fetch_timeout.as_secs()),
            retryable: true,
        })
        .and_then(|r| r);

        let messages = match fetched {
            Ok(messages) => messages,
            Err(e) => {
                self.record_failure(&e);
                return Err(e);
            }
        };

        let mut summary = TickSummary {
            fetched: messages.len(),
            ..TickSummary::default()
        };

        if !cursor.is_initialized() && self.config.skip_backlog_on_first_run {
            for msg in &messages {
                self.deps.dedup.is_new(&msg.provider_message_id);
                cursor.advance(msg);
            }
            info!(
                "first poll: {} existing message(s) marked as seen, processing new ones from now on",
                messages.len()
            );
            summary.skipped = messages.len();
            summary.backlog_skipped = true;
        } else {
            for msg in &messages {
                match self.process_message(msg, now) {
                    Disposition::Queued { .. } => summary.queued += 1,
                    Disposition::Rejected { .. } | Disposition::QueueFull { .. } => {
                        summary.rejected += 1;
                    }
                    Disposition::AlreadySeen | Disposition::Expired => summary.skipped += 1,
                }
                cursor.advance(msg);
            }
        }
        cursor.initialized = true;
        self.cursor_file.save(&cursor);

        if summary.queued + summary.rejected > 0 {
            info!(
                "poll: {} fetched, {} queued, {} rejected, {} skipped",
                summary.fetched, summary.queued, summary.rejected, summary.skipped
            );
        } else {
            debug!("poll: {} fetched, nothing new", summary.fetched);
        }

        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        status.last_poll_at = Some(now);
        status.last_success_at = Some(now);
        status.last_error = None;
        status.consecutive_failures = 0;
        status.last_summary = Some(summary.clone());
        status.cursor = cursor.clone();
        Ok(summary)
    }

    fn record_failure(&self, err: &MarqueeError) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        status.last_poll_at = Some(Utc::now());
        status.last_error = Some(err.to_string());
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        if err.is_retryable() {
            warn!("poll failed (attempt {}): {}", status.consecutive_failures, err);
        } else {
            error!("poll failed (attempt {}): {}", status.consecutive_failures, err);
        }
    }

    /// Dedup, age cutoff, then [`Self::admit`].
    pub fn process_message(&self, msg: &InboundMessage, now: DateTime<Utc>) -> Disposition {
        if !self.deps.dedup.is_new(&msg.provider_message_id) {
            debug!("already processed {}", msg.provider_message_id);
            return Disposition::AlreadySeen;
        }
        info!(
            "new text from {}: '{}'",
            crate::utils::mask_phone(&msg.from_phone),
            msg.body
        );
        if let Some(max_age) = self.max_age
            && now - msg.received_at > max_age
        {
            info!("skipping stale message {}", msg.provider_message_id);
            self.deps.log.record(LogEntry::new(
                &msg.provider_message_id,
                &msg.from_phone,
                &msg.body,
                "",
                MessageStatus::Expired,
            ));
            return Disposition::Expired;
        }
        self.admit(msg)
    }

    /// Filter and queue one message, log it and queue the reply. No dedup.
    pub fn admit(&self, msg: &InboundMessage) -> Disposition {
        self.admit_with(msg, true)
    }

    /// [`Self::admit`] without the SMS reply, for injected test messages.
    pub fn admit_silently(&self, msg: &InboundMessage) -> Disposition {
        self.admit_with(msg, false)
    }

    fn admit_with(&self, msg: &InboundMessage, send_replies: bool) -> Disposition {
        let day = Local::now().date_naive();
        let verdict = self.deps.filter.evaluate_on(msg, day);
        let phone = msg.from_phone.as_str();

        if !verdict.accept {
            self.deps.log.record(LogEntry::new(
                &msg.provider_message_id,
                phone,
                &msg.body,
                &verdict.display_name,
                MessageStatus::from(verdict.reason),
            ));
            if send_replies {
                self.reply(ReplyKind::Verdict(verdict.reason), phone, &verdict.display_name);
            }
            return Disposition::Rejected {
                reason: verdict.reason,
                name: verdict.display_name,
            };
        }

        let name = verdict.display_name;
        // logged before enqueueing so the coordinator always finds the entry
        self.deps.log.record(LogEntry::new(
            &msg.provider_message_id,
            phone,
            &msg.body,
            &name,
            MessageStatus::Queued,
        ));
        let request = DisplayRequest::new(&name, phone, &msg.provider_message_id);
        match self.deps.queue.enqueue(request) {
            Ok(enqueued) => {
                if let Some(evicted) = enqueued.evicted {
                    self.deps
                        .log
                        .update_status(&evicted.message_id, MessageStatus::Dropped);
                }
                info!("queued '{}' at position {}", name, enqueued.position);
                if send_replies {
                    self.reply(ReplyKind::Verdict(Reason::Accepted), phone, &name);
                }
                Disposition::Queued {
                    name,
                    position: enqueued.position,
                }
            }
            Err(e) => {
                warn!("'{}' not queued: {}", name, e);
                self.deps.filter.release(phone, day, &name);
                self.deps
                    .log
                    .update_status(&msg.provider_message_id, MessageStatus::QueueFull);
                if send_replies {
                    self.reply(ReplyKind::QueueFull, phone, &name);
                }
                Disposition::QueueFull { name }
            }
        }
    }

    fn reply(&self, kind: ReplyKind, phone: &str, name: &str) {
        let Some(responder) = &self.deps.responder else {
            return;
        };
        if let Some(reply) = self.deps.templates.render(kind, phone, name) {
            responder.send(reply);
        }
    }

    fn next_delay(&self) -> Duration {
        let failures = self.status().consecutive_failures;
        let interval = self.config.interval_secs.max(1);
        if failures == 0 {
            return Duration::from_secs(interval);
        }
        let secs = crate::utils::exponential_backoff_delay(
            failures - 1,
            interval,
            self.config.max_backoff_secs.max(interval),
        );
        let jitter_ms = fastrand::u64(0..=secs * 250);
        Duration::from_secs(secs) + Duration::from_millis(jitter_ms)
    }

    /// Tick until shutdown. A fetch in flight is abandoned on shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "inbound poller started (every {}s via {})",
            self.config.interval_secs,
            self.deps.provider.name()
        );
        loop {
            tokio::select! {
                _ = self.tick() => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
            let delay = self.next_delay();
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }
        info!("inbound poller stopped");
    }
}
