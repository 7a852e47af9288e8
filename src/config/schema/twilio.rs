use serde::{Deserialize, Serialize};

fn default_api_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_lookback_mins() -> u64 {
    10
}

fn default_page_size() -> u32 {
    20
}

fn default_timeout_secs() -> u64 {
    15
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default, rename = "accountSid")]
    pub account_sid: String,
    #[serde(default, rename = "authToken")]
    pub auth_token: String,
    /// The number viewers text; inbound messages are listed by `To`.
    #[serde(default, rename = "phoneNumber")]
    pub phone_number: String,
    #[serde(default = "default_api_base_url", rename = "apiBaseUrl")]
    pub api_base_url: String,
    /// How far back each fetch looks when the cursor is older (or absent).
    #[serde(default = "default_lookback_mins", rename = "lookbackMins")]
    pub lookback_mins: u64,
    #[serde(default = "default_page_size", rename = "pageSize")]
    pub page_size: u32,
    #[serde(default = "default_timeout_secs", rename = "timeoutSecs")]
    pub timeout_secs: u64,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            phone_number: String::new(),
            api_base_url: default_api_base_url(),
            lookback_mins: default_lookback_mins(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

redact_debug!(
    TwilioConfig,
    redact(account_sid),
    redact(auth_token),
    phone_number,
    api_base_url,
    lookback_mins,
    page_size,
    timeout_secs,
);
