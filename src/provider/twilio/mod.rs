use super::{Cursor, InboundMessage, SmsProvider};
use crate::config::TwilioConfig;
use crate::errors::MarqueeError;
use crate::utils::http::{error_body, http_client};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Twilio's ceiling for a single SMS body.
const MAX_SMS_CHARS: usize = 1600;
const MAX_LOOKBACK_MINS: u64 = 60 * 24 * 365;

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    messages: Vec<TwilioMessage>,
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    date_sent: Option<String>,
    #[serde(default)]
    date_created: Option<String>,
}

impl TwilioMessage {
    fn received_at(&self) -> Option<DateTime<Utc>> {
        [&self.date_sent, &self.date_created]
            .into_iter()
            .flatten()
            .find_map(|raw| DateTime::parse_from_rfc2822(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn into_inbound(self) -> Option<InboundMessage> {
        if self.direction.as_deref().is_some_and(|d| d != "inbound") {
            return None;
        }
        let received_at = self.received_at().unwrap_or_else(Utc::now);
        Some(InboundMessage {
            provider_message_id: self.sid,
            from_phone: self.from?,
            body: self.body.unwrap_or_default(),
            received_at,
        })
    }
}

pub struct TwilioProvider {
    config: TwilioConfig,
    base_url: String,
    client: reqwest::Client,
}

impl TwilioProvider {
    pub fn new(config: TwilioConfig) -> Self {
        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        let client = http_client(Duration::from_secs(config.timeout_secs));
        Self {
            config,
            base_url,
            client,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url,
            urlencoding::encode(&self.config.account_sid)
        )
    }

    fn classify_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }
}

#[async_trait]
impl SmsProvider for TwilioProvider {
    fn name(&self) -> &'static str {
        "twilio"
    }

    async fn fetch_messages_since(
        &self,
        cursor: &Cursor,
    ) -> Result<Vec<InboundMessage>, MarqueeError> {
        let lookback_mins = self.config.lookback_mins.min(MAX_LOOKBACK_MINS);
        let lookback = chrono::Duration::minutes(i64::try_from(lookback_mins).unwrap_or(0));
        let since = Utc::now() - lookback;
        let page_size = self.config.page_size.to_string();
        let since_param = since.format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let response = self
            .client
            .get(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .query(&[
                ("To", self.config.phone_number.as_str()),
                ("DateSent>", since_param.as_str()),
                ("PageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MarqueeError::ProviderFetch {
                message: format!("request failed: {e}"),
                retryable: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(MarqueeError::ProviderFetch {
                message: format!("twilio API error ({}): {}", status, body),
                retryable: Self::classify_status(status),
            });
        }

        let page: MessagePage = response
            .json()
            .await
            .map_err(|e| MarqueeError::ProviderFetch {
                message: format!("malformed message list: {e}"),
                retryable: true,
            })?;

        // Twilio lists newest first
        let mut messages: Vec<InboundMessage> = page
            .messages
            .into_iter()
            .rev()
            .filter_map(TwilioMessage::into_inbound)
            .collect();
        messages.sort_by_key(|m| m.received_at);
        if let Some(mark) = cursor.last_received_at {
            messages.retain(|m| m.received_at >= mark);
        }
        debug!("twilio returned {} candidate messages", messages.len());
        Ok(messages)
    }

    async fn send_sms(&self, to_phone: &str, body: &str) -> Result<(), MarqueeError> {
        let body: String = if body.chars().count() > MAX_SMS_CHARS {
            warn!("twilio: reply longer than {} chars truncated", MAX_SMS_CHARS);
            body.chars().take(MAX_SMS_CHARS).collect()
        } else {
            body.to_string()
        };

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("Body", body.as_str()),
                ("To", to_phone),
                ("From", self.config.phone_number.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MarqueeError::ProviderSend(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body(response).await;
            return Err(MarqueeError::ProviderSend(format!(
                "twilio API error ({}): {}",
                status, body
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
