//! Bounded FIFO of approved display requests.

use crate::config::{OverflowPolicy, QueueConfig};
use crate::errors::MarqueeError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRequest {
    pub name: String,
    pub source_phone: String,
    pub enqueued_at: DateTime<Utc>,
    /// Provider id of the message that produced this request.
    pub message_id: String,
}

impl DisplayRequest {
    pub fn new(
        name: impl Into<String>,
        source_phone: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_phone: source_phone.into(),
            enqueued_at: Utc::now(),
            message_id: message_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    /// 1-based position in the queue after insertion.
    pub position: usize,
    /// Request pushed out under [`OverflowPolicy::DropOldest`].
    pub evicted: Option<DisplayRequest>,
}

pub struct DisplayQueue {
    items: Mutex<VecDeque<DisplayRequest>>,
    capacity: usize,
    overflow: OverflowPolicy,
    ready: Notify,
}

impl DisplayQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(config.capacity.min(1024))),
            capacity: config.capacity.max(1),
            overflow: config.overflow_policy,
            ready: Notify::new(),
        }
    }

    pub fn enqueue(&self, req: DisplayRequest) -> Result<Enqueued, MarqueeError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let mut evicted = None;
        if items.len() >= self.capacity {
            match self.overflow {
                OverflowPolicy::RejectNewest => {
                    return Err(MarqueeError::QueueOverflow {
                        capacity: self.capacity,
                    });
                }
                OverflowPolicy::DropOldest => {
                    evicted = items.pop_front();
                    if let Some(old) = &evicted {
                        warn!(
                            "display queue full, dropped oldest request '{}' from {}",
                            old.name,
                            crate::utils::mask_phone(&old.source_phone)
                        );
                    }
                }
            }
        }
        items.push_back(req);
        let position = items.len();
        drop(items);
        self.ready.notify_one();
        Ok(Enqueued { position, evicted })
    }

    pub fn dequeue(&self) -> Option<DisplayRequest> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    pub fn size(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queued requests in display order.
    pub fn peek_all(&self) -> Vec<DisplayRequest> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Resolves once something was enqueued since the last wake-up.
    pub async fn wait_ready(&self) {
        self.ready.notified().await;
    }
}
