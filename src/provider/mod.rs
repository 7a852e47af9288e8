pub mod twilio;

use crate::errors::MarqueeError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use twilio::TwilioProvider;

/// One text received by the provider. Never mutated after fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub provider_message_id: String,
    pub from_phone: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// High-water mark of processed messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(default, rename = "lastReceivedAt")]
    pub last_received_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "lastMessageId")]
    pub last_message_id: Option<String>,
    /// Set once the first fetch has been handled, even if it returned nothing.
    #[serde(default)]
    pub initialized: bool,
}

impl Cursor {
    pub fn is_initialized(&self) -> bool {
        self.initialized || self.last_received_at.is_some()
    }

    /// Move forward to `msg` if it is later than the current mark.
    pub fn advance(&mut self, msg: &InboundMessage) {
        if self
            .last_received_at
            .is_none_or(|current| msg.received_at >= current)
        {
            self.last_received_at = Some(msg.received_at);
            self.last_message_id = Some(msg.provider_message_id.clone());
        }
    }
}

#[async_trait]
pub trait SmsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Messages received at or after the cursor, oldest first. May repeat
    /// messages already returned by an earlier call.
    async fn fetch_messages_since(&self, cursor: &Cursor)
    -> Result<Vec<InboundMessage>, MarqueeError>;

    async fn send_sms(&self, to_phone: &str, body: &str) -> Result<(), MarqueeError>;
}

#[cfg(test)]
pub(crate) mod mock;
