//! Single-slot display scheduler.
//!
//! `Idle -> Presenting -> Idle` until shutdown, then `Stopped`. The slot
//! mutex is held for a whole presentation, so a second request is never
//! dequeued before the current hold has elapsed.

use crate::config::{DisplayConfig, ShutdownPolicy};
use crate::display::DisplayTrigger;
use crate::errors::MarqueeError;
use crate::message_log::{MessageLog, MessageStatus};
use crate::queue::{DisplayQueue, DisplayRequest};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Presenting,
    Stopped,
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Presenting => write!(f, "presenting"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub state: CoordinatorState,
    pub current: Option<DisplayRequest>,
    pub presented: u64,
    pub failed: u64,
    pub last_error: Option<String>,
    pub last_presented_at: Option<DateTime<Utc>>,
}

impl Default for CoordinatorStatus {
    fn default() -> Self {
        Self {
            state: CoordinatorState::Idle,
            current: None,
            presented: 0,
            failed: 0,
            last_error: None,
            last_presented_at: None,
        }
    }
}

/// What one [`DisplayCoordinator::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Presented,
    Failed,
    Empty,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldEnd {
    Elapsed,
    FinishedThenStopped,
    CutShort,
}

/// Resolves when shutdown was requested or the sender went away.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

pub struct DisplayCoordinator {
    queue: Arc<DisplayQueue>,
    trigger: Arc<dyn DisplayTrigger>,
    log: Arc<MessageLog>,
    config: DisplayConfig,
    status: RwLock<CoordinatorStatus>,
    slot: Mutex<()>,
}

impl DisplayCoordinator {
    pub fn new(
        config: DisplayConfig,
        queue: Arc<DisplayQueue>,
        trigger: Arc<dyn DisplayTrigger>,
        log: Arc<MessageLog>,
    ) -> Self {
        Self {
            queue,
            trigger,
            log,
            config,
            status: RwLock::new(CoordinatorStatus::default()),
            slot: Mutex::new(()),
        }
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> CoordinatorState {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    fn update(&self, f: impl FnOnce(&mut CoordinatorStatus)) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }

    /// Present the queue head, if any, and hold it for the display duration.
    pub async fn step(&self, shutdown: &mut watch::Receiver<bool>) -> StepOutcome {
        let _slot = self.slot.lock().await;
        if *shutdown.borrow() {
            self.update(|s| s.state = CoordinatorState::Stopped);
            return StepOutcome::Stopped;
        }
        let Some(req) = self.queue.dequeue() else {
            return StepOutcome::Empty;
        };

        let masked = crate::utils::mask_phone(&req.source_phone);
        info!("now displaying '{}' (from {})", req.name, masked);
        self.update(|s| {
            s.state = CoordinatorState::Presenting;
            s.current = Some(req.clone());
        });
        self.log
            .update_status(&req.message_id, MessageStatus::Displaying);

        if let Err(e) = self.trigger_with_timeout(&req).await {
            error!("display of '{}' dropped: {}", req.name, e);
            self.log
                .update_status(&req.message_id, MessageStatus::DisplayFailed);
            self.update(|s| {
                s.state = CoordinatorState::Idle;
                s.current = None;
                s.failed += 1;
                s.last_error = Some(e.to_string());
            });
            return StepOutcome::Failed;
        }

        let end = self.hold(shutdown).await;
        let stopped = end != HoldEnd::Elapsed;

        let resume = self.config.return_to_schedule && self.queue.is_empty();
        let finish = tokio::time::timeout(
            Duration::from_secs(self.config.trigger_timeout_secs),
            self.trigger
                .finish_presentation(&self.config.overlay_model_name, resume),
        )
        .await;
        match finish {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("finishing display of '{}': {}", req.name, e),
            Err(_) => warn!("finishing display of '{}' timed out", req.name),
        }

        let completed = end != HoldEnd::CutShort;
        if completed {
            self.log
                .update_status(&req.message_id, MessageStatus::Displayed);
            info!("finished displaying '{}'", req.name);
        } else {
            self.log
                .update_status(&req.message_id, MessageStatus::Dropped);
            warn!("display of '{}' cut short by shutdown", req.name);
        }
        self.update(|s| {
            s.state = if stopped {
                CoordinatorState::Stopped
            } else {
                CoordinatorState::Idle
            };
            s.current = None;
            if completed {
                s.presented += 1;
                s.last_presented_at = Some(Utc::now());
            }
        });
        if stopped {
            StepOutcome::Stopped
        } else {
            StepOutcome::Presented
        }
    }

    async fn trigger_with_timeout(&self, req: &DisplayRequest) -> Result<(), MarqueeError> {
        let limit = Duration::from_secs(self.config.trigger_timeout_secs);
        tokio::time::timeout(
            limit,
            self.trigger.present_name(
                &req.name,
                &self.config.overlay_model_name,
                &self.config.message_template,
            ),
        )
        .await
        .map_err(|_| {
            MarqueeError::DisplayTrigger(format!("timed out after {}s", limit.as_secs()))
        })?
    }

    /// Wait out the display duration, or less if shutdown cuts it short.
    async fn hold(&self, shutdown: &mut watch::Receiver<bool>) -> HoldEnd {
        let deadline = Instant::now() + Duration::from_secs(self.config.duration_secs);
        debug!("holding for {}s", self.config.duration_secs);
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => HoldEnd::Elapsed,
            () = shutdown_requested(shutdown) => {
                match self.config.shutdown_policy {
                    ShutdownPolicy::FinishCurrent => {
                        let grace = Instant::now()
                            + Duration::from_secs(self.config.shutdown_grace_secs);
                        info!("shutdown requested, finishing current display");
                        tokio::time::sleep_until(deadline.min(grace)).await;
                        if grace < deadline {
                            HoldEnd::CutShort
                        } else {
                            HoldEnd::FinishedThenStopped
                        }
                    }
                    ShutdownPolicy::Abandon => {
                        info!("shutdown requested, abandoning current display");
                        HoldEnd::CutShort
                    }
                }
            }
        }
    }

    /// Drive the queue until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("display coordinator started");
        self.update(|s| s.state = CoordinatorState::Idle);
        loop {
            match self.step(&mut shutdown).await {
                StepOutcome::Stopped => break,
                StepOutcome::Empty => {
                    tokio::select! {
                        () = self.queue.wait_ready() => {}
                        () = shutdown_requested(&mut shutdown) => break,
                    }
                }
                StepOutcome::Presented | StepOutcome::Failed => {}
            }
        }
        self.update(|s| {
            s.state = CoordinatorState::Stopped;
            s.current = None;
        });
        info!("display coordinator stopped");
    }
}
