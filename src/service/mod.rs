//! Wires the pipeline together and owns its lifecycle.
//!
//! A [`MarqueeService`] builds every shared component once. `start` spawns
//! the poller and the display coordinator against a fresh shutdown signal,
//! `stop` flips the signal and waits for both loops to exit.

use crate::config::{Config, ResolvedPaths};
use crate::coordinator::{CoordinatorStatus, DisplayCoordinator};
use crate::dedup::Deduplicator;
use crate::display::{DisplayTrigger, FppClient};
use crate::errors::MarqueeError;
use crate::filter::MessageFilter;
use crate::ledger::RateLedger;
use crate::message_log::MessageLog;
use crate::poller::{Disposition, InboundPoller, PollStatus, PollerDeps};
use crate::policy::{PolicyFreshness, PolicyStore};
use crate::provider::twilio::TwilioProvider;
use crate::provider::{InboundMessage, SmsProvider};
use crate::queue::{DisplayQueue, DisplayRequest};
use crate::responder::{ReplyTemplates, ResponseSender};
use crate::utils::task_tracker::TaskTracker;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Extra slack on top of the provider's own HTTP timeout.
const FETCH_TIMEOUT_SLACK_SECS: u64 = 5;

/// How long `stop` waits past the display grace before aborting workers.
const STOP_SLACK_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub size: usize,
    pub capacity: usize,
    pub items: Vec<DisplayRequest>,
}

/// Read-only view of the whole pipeline for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub enabled: bool,
    pub running: bool,
    pub queue: QueueSnapshot,
    pub coordinator: CoordinatorStatus,
    pub poller: PollStatus,
    pub policy: Vec<PolicyFreshness>,
    pub replies_dropped: u64,
    pub generated_at: DateTime<Utc>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    tasks: TaskTracker,
}

pub struct MarqueeService {
    config: Config,
    paths: ResolvedPaths,
    policy: Arc<PolicyStore>,
    filter: Arc<MessageFilter>,
    queue: Arc<DisplayQueue>,
    log: Arc<MessageLog>,
    poller: Arc<InboundPoller>,
    coordinator: Arc<DisplayCoordinator>,
    responder: Option<Arc<ResponseSender>>,
    _reply_worker: Option<JoinHandle<()>>,
    lifecycle: Mutex<Option<Running>>,
    running: AtomicBool,
}

impl MarqueeService {
    /// Twilio in, FPP out, state under the configured paths.
    pub fn from_config(config: Config, home: &Path) -> Result<Self> {
        let paths = config.paths.resolve(home);
        let provider: Arc<dyn SmsProvider> = Arc::new(TwilioProvider::new(config.twilio.clone()));
        let trigger: Arc<dyn DisplayTrigger> = Arc::new(FppClient::new(config.display.clone()));
        Self::with_parts(config, paths, provider, trigger)
    }

    /// Build around an arbitrary provider and display trigger.
    ///
    /// Must be called inside a tokio runtime: the reply worker is spawned here.
    pub fn with_parts(
        config: Config,
        paths: ResolvedPaths,
        provider: Arc<dyn SmsProvider>,
        trigger: Arc<dyn DisplayTrigger>,
    ) -> Result<Self> {
        crate::utils::ensure_dir(&paths.state_dir)?;

        let policy = Arc::new(PolicyStore::from_paths(&paths));
        policy.reload_if_changed();
        if config.filter.profanity_filter && !paths.blacklist.exists() {
            warn!(
                "profanity filter is on but {} does not exist; nothing will be filtered",
                paths.blacklist.display()
            );
        }
        if config.filter.use_whitelist && policy.whitelist_is_empty() {
            warn!("whitelist is enabled but empty; every name will be allowed");
        }

        let ledger = Arc::new(RateLedger::open(&paths.ledger_file())?);
        let filter = Arc::new(MessageFilter::new(
            config.filter.clone(),
            Arc::clone(&policy),
            ledger,
        ));
        let dedup = Arc::new(
            Deduplicator::open(&paths.seen_file(), config.dedup.retention_days)
                .context("failed to open seen-message store")?,
        );
        let queue = Arc::new(DisplayQueue::new(&config.queue));
        let log = Arc::new(MessageLog::open(&paths.message_log_file()));

        let (responder, reply_worker) = if config.responses.enabled {
            let (sender, worker) =
                ResponseSender::spawn(Arc::clone(&provider), config.responses.worker_capacity);
            (Some(Arc::new(sender)), Some(worker))
        } else {
            (None, None)
        };

        let fetch_timeout =
            Duration::from_secs(config.twilio.timeout_secs + FETCH_TIMEOUT_SLACK_SECS);
        let poller = InboundPoller::new(
            PollerDeps {
                provider,
                policy: Arc::clone(&policy),
                filter: Arc::clone(&filter),
                dedup,
                queue: Arc::clone(&queue),
                log: Arc::clone(&log),
                templates: ReplyTemplates::new(config.responses.clone()),
                responder: responder.clone(),
            },
            config.polling.clone(),
            fetch_timeout,
            Some(&paths.cursor_file()),
        )?;
        let coordinator = DisplayCoordinator::new(
            config.display.clone(),
            Arc::clone(&queue),
            trigger,
            Arc::clone(&log),
        );

        Ok(Self {
            config,
            paths,
            policy,
            filter,
            queue,
            log,
            poller: Arc::new(poller),
            coordinator: Arc::new(coordinator),
            responder,
            _reply_worker: reply_worker,
            lifecycle: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    /// Spawn the poller and coordinator. Starting twice is a no-op.
    pub async fn start(&self) -> Result<(), MarqueeError> {
        if !self.config.enabled {
            return Err(MarqueeError::Config(
                "marquee is disabled; set \"enabled\": true to start it".into(),
            ));
        }
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            warn!("marquee already running");
            return Ok(());
        }

        let (tx, rx) = watch::channel(false);
        let tasks = TaskTracker::new();

        let poller = Arc::clone(&self.poller);
        let poller_rx = rx.clone();
        tasks
            .spawn(
                "poller",
                tokio::spawn(async move { poller.run(poller_rx).await }),
            )
            .await;

        let coordinator = Arc::clone(&self.coordinator);
        tasks
            .spawn(
                "coordinator",
                tokio::spawn(async move { coordinator.run(rx).await }),
            )
            .await;

        *lifecycle = Some(Running {
            shutdown: tx,
            tasks,
        });
        self.running.store(true, Ordering::SeqCst);
        info!("marquee started");
        Ok(())
    }

    /// Signal shutdown and wait for both loops. Stopping a stopped service is a no-op.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        let wait = Duration::from_secs(self.config.display.shutdown_grace_secs + STOP_SLACK_SECS);
        running.tasks.wait_all(wait).await;
        self.running.store(false, Ordering::SeqCst);
        info!("marquee stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Names of the background loops that are still alive.
    pub async fn workers(&self) -> Vec<String> {
        match self.lifecycle.lock().await.as_ref() {
            Some(running) => running.tasks.running().await,
            None => Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    pub fn policy(&self) -> &Arc<PolicyStore> {
        &self.policy
    }

    pub fn queue(&self) -> &Arc<DisplayQueue> {
        &self.queue
    }

    pub fn log(&self) -> &Arc<MessageLog> {
        &self.log
    }

    pub fn poller(&self) -> &Arc<InboundPoller> {
        &self.poller
    }

    pub fn coordinator(&self) -> &Arc<DisplayCoordinator> {
        &self.coordinator
    }

    pub fn filter(&self) -> &Arc<MessageFilter> {
        &self.filter
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            enabled: self.config.enabled,
            running: self.is_running(),
            queue: QueueSnapshot {
                size: self.queue.size(),
                capacity: self.queue.capacity(),
                items: self.queue.peek_all(),
            },
            coordinator: self.coordinator.status(),
            poller: self.poller.status(),
            policy: self.policy.freshness(),
            replies_dropped: self.responder.as_ref().map_or(0, |r| r.dropped()),
            generated_at: Utc::now(),
        }
    }

    /// Push a text through filter and queue as if it had arrived by SMS.
    /// No reply is sent.
    pub fn inject(&self, from_phone: &str, body: &str) -> Disposition {
        self.policy.reload_if_changed();
        let msg = InboundMessage {
            provider_message_id: format!("test-{}", uuid::Uuid::new_v4()),
            from_phone: from_phone.to_string(),
            body: body.to_string(),
            received_at: Utc::now(),
        };
        self.poller.admit_silently(&msg)
    }
}
