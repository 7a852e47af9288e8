//! Fire-and-forget SMS replies.
//!
//! The poller hands replies to a bounded channel and moves on; one worker
//! task drains it through the provider. A full channel drops the reply.

use crate::config::ResponsesConfig;
use crate::filter::Reason;
use crate::provider::SmsProvider;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRequest {
    pub to_phone: String,
    pub message: String,
}

/// What a reply is acknowledging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Verdict(Reason),
    QueueFull,
}

/// Reply wording keyed by verdict reason.
#[derive(Debug, Clone)]
pub struct ReplyTemplates {
    config: ResponsesConfig,
}

impl ReplyTemplates {
    pub fn new(config: ResponsesConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn template(&self, kind: ReplyKind) -> &str {
        let c = &self.config;
        match kind {
            ReplyKind::Verdict(Reason::Accepted) => &c.success,
            ReplyKind::Verdict(Reason::PhoneBlocked) => &c.blocked,
            ReplyKind::Verdict(Reason::RateLimited) => &c.rate_limited,
            ReplyKind::Verdict(Reason::InvalidFormat) => &c.invalid_format,
            ReplyKind::Verdict(Reason::Duplicate) => &c.duplicate,
            ReplyKind::Verdict(Reason::NotWhitelisted) => &c.not_whitelisted,
            ReplyKind::Verdict(Reason::Profanity) => &c.profanity,
            ReplyKind::QueueFull => &c.queue_full,
        }
    }

    /// The reply to send, or `None` when replies are off or the template is blank.
    pub fn render(&self, kind: ReplyKind, to_phone: &str, name: &str) -> Option<ReplyRequest> {
        if !self.config.enabled {
            return None;
        }
        let template = self.template(kind).trim();
        if template.is_empty() {
            return None;
        }
        Some(ReplyRequest {
            to_phone: to_phone.to_string(),
            message: template.replace("{name}", name),
        })
    }
}

pub struct ResponseSender {
    tx: mpsc::Sender<ReplyRequest>,
    dropped: AtomicU64,
}

impl ResponseSender {
    /// Start the send worker. It exits once every sender handle is dropped.
    pub fn spawn(provider: Arc<dyn SmsProvider>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ReplyRequest>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(reply) = rx.recv().await {
                let masked = crate::utils::mask_phone(&reply.to_phone);
                match provider.send_sms(&reply.to_phone, &reply.message).await {
                    Ok(()) => debug!("reply sent to {}", masked),
                    Err(e) => warn!("reply to {} failed: {}", masked, e),
                }
            }
            debug!("response worker stopped");
        });
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            handle,
        )
    }

    /// Hand a reply to the worker without waiting. Never fails the caller.
    pub fn send(&self, reply: ReplyRequest) {
        if let Err(e) = self.tx.try_send(reply) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let (reason, reply) = match e {
                mpsc::error::TrySendError::Full(r) => ("queue full", r),
                mpsc::error::TrySendError::Closed(r) => ("worker stopped", r),
            };
            warn!(
                "dropping reply to {} ({})",
                crate::utils::mask_phone(&reply.to_phone),
                reason
            );
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
