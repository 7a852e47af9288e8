use super::{Cursor, InboundMessage, SmsProvider};
use crate::errors::MarqueeError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Scripted provider: each fetch pops the next scripted batch (or repeats
/// the inbox), sends are recorded.
#[derive(Clone, Default)]
pub(crate) struct MockProvider {
    pub inbox: Arc<Mutex<Vec<InboundMessage>>>,
    pub fetch_errors: Arc<Mutex<VecDeque<MarqueeError>>>,
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
    pub fail_sends: Arc<std::sync::atomic::AtomicBool>,
    pub fetches: Arc<std::sync::atomic::AtomicUsize>,
}

impl MockProvider {
    pub fn push(&self, msg: InboundMessage) {
        self.inbox.lock().unwrap().push(msg);
    }

    pub fn fail_next_fetch(&self, err: MarqueeError) {
        self.fetch_errors.lock().unwrap().push_back(err);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

pub(crate) fn inbound(id: &str, from: &str, body: &str, at: DateTime<Utc>) -> InboundMessage {
    InboundMessage {
        provider_message_id: id.into(),
        from_phone: from.into(),
        body: body.into(),
        received_at: at,
    }
}

#[async_trait]
impl SmsProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_messages_since(
        &self,
        cursor: &Cursor,
    ) -> Result<Vec<InboundMessage>, MarqueeError> {
        self.fetches
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(err) = self.fetch_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut messages: Vec<InboundMessage> = self
            .inbox
            .lock()
            .unwrap()
            .iter()
            .filter(|m| cursor.last_received_at.is_none_or(|at| m.received_at >= at))
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.received_at);
        Ok(messages)
    }

    async fn send_sms(&self, to_phone: &str, body: &str) -> Result<(), MarqueeError> {
        if self.fail_sends.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(MarqueeError::ProviderSend("mock send failure".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to_phone.to_string(), body.to_string()));
        Ok(())
    }
}
