// Shared test helpers: not all items used by every test binary.
#![allow(unused)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee::config::{Config, PathsConfig};
use marquee::display::{DisplayTrigger, render_template};
use marquee::errors::MarqueeError;
use marquee::provider::{Cursor, InboundMessage, SmsProvider};
use marquee::service::MarqueeService;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// In-memory SMS gateway: texts pushed here come back from every fetch at or
/// after the cursor, like a provider listing by date.
#[derive(Clone, Default)]
pub struct FakeSmsGateway {
    inbox: Arc<Mutex<Vec<InboundMessage>>>,
    errors: Arc<Mutex<VecDeque<MarqueeError>>>,
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeSmsGateway {
    pub fn text(&self, id: &str, from: &str, body: &str) {
        self.text_at(id, from, body, Utc::now());
    }

    pub fn text_at(&self, id: &str, from: &str, body: &str, at: DateTime<Utc>) {
        self.inbox.lock().unwrap().push(InboundMessage {
            provider_message_id: id.to_string(),
            from_phone: from.to_string(),
            body: body.to_string(),
            received_at: at,
        });
    }

    pub fn fail_next_fetch(&self, message: &str) {
        self.errors
            .lock()
            .unwrap()
            .push_back(MarqueeError::ProviderFetch {
                message: message.to_string(),
                retryable: true,
            });
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsProvider for FakeSmsGateway {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_messages_since(
        &self,
        cursor: &Cursor,
    ) -> Result<Vec<InboundMessage>, MarqueeError> {
        if let Some(err) = self.errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut out: Vec<InboundMessage> = self
            .inbox
            .lock()
            .unwrap()
            .iter()
            .filter(|m| cursor.last_received_at.is_none_or(|at| m.received_at >= at))
            .cloned()
            .collect();
        out.sort_by_key(|m| m.received_at);
        Ok(out)
    }

    async fn send_sms(&self, to_phone: &str, body: &str) -> Result<(), MarqueeError> {
        self.sent
            .lock()
            .unwrap()
            .push((to_phone.to_string(), body.to_string()));
        Ok(())
    }
}

/// Display that records what it was asked to show.
#[derive(Clone, Default)]
pub struct FakeDisplay {
    pub shown: Arc<Mutex<Vec<String>>>,
    pub fail: Arc<std::sync::atomic::AtomicBool>,
}

impl FakeDisplay {
    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }
}

#[async_trait]
impl DisplayTrigger for FakeDisplay {
    async fn present_name(
        &self,
        display_name: &str,
        _overlay_target: &str,
        template: &str,
    ) -> Result<(), MarqueeError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(MarqueeError::DisplayTrigger("controller offline".into()));
        }
        self.shown
            .lock()
            .unwrap()
            .push(render_template(template, display_name));
        Ok(())
    }
}

/// A service wired to the fakes, with its files in a temp dir.
pub struct Rig {
    pub dir: TempDir,
    pub sms: FakeSmsGateway,
    pub display: FakeDisplay,
    pub service: Arc<MarqueeService>,
}

/// Config for fast pipeline tests: short holds, replies on, no backlog skip.
pub fn pipeline_config() -> Config {
    let mut config: Config = serde_json::from_str("{}").unwrap();
    config.enabled = true;
    config.twilio.account_sid = "AC_test".into();
    config.twilio.auth_token = "token".into();
    config.twilio.phone_number = "+15550100000".into();
    config.display.duration_secs = 1;
    config.display.shutdown_grace_secs = 1;
    config.display.message_template = "Merry Christmas {name}!".into();
    config.polling.interval_secs = 1;
    config.polling.skip_backlog_on_first_run = false;
    config.responses.enabled = true;
    config
}

/// Write policy files, then build the service.
pub fn rig(config: Config, blacklist: &str, whitelist: &str) -> Rig {
    let dir = TempDir::new().expect("create temp dir");
    rig_in(dir, config, blacklist, whitelist, FakeSmsGateway::default())
}

pub fn rig_in(
    dir: TempDir,
    config: Config,
    blacklist: &str,
    whitelist: &str,
    sms: FakeSmsGateway,
) -> Rig {
    std::fs::write(dir.path().join("blacklist.txt"), blacklist).unwrap();
    std::fs::write(dir.path().join("whitelist.txt"), whitelist).unwrap();
    let paths = PathsConfig::default().resolve(dir.path());
    let display = FakeDisplay::default();
    let service = MarqueeService::with_parts(
        config,
        paths,
        Arc::new(sms.clone()),
        Arc::new(display.clone()),
    )
    .expect("build service");
    Rig {
        dir,
        sms,
        display,
        service: Arc::new(service),
    }
}

/// Poll `check` every 100ms (virtual or real) until it holds or 100 tries pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    check()
}
