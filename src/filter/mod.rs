//! Accept/reject decision for one inbound message.

use crate::config::FilterConfig;
use crate::ledger::{RateLedger, RecordOutcome};
use crate::policy::PolicyStore;
use crate::provider::InboundMessage;
use chrono::{Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

/// Names longer than this are never displayed, whatever the length cap.
const MAX_NAME_CHARS: usize = 50;

fn greeting_re() -> &'static Regex {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)^(?:hi|hello|hey|merry christmas|happy holidays)\b[,!.\s]*")
            .expect("failed to compile greeting regex")
    });
    &RE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    Accepted,
    PhoneBlocked,
    RateLimited,
    InvalidFormat,
    Duplicate,
    NotWhitelisted,
    Profanity,
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Accepted => "ACCEPTED",
            Self::PhoneBlocked => "PHONE_BLOCKED",
            Self::RateLimited => "RATE_LIMITED",
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::Duplicate => "DUPLICATE",
            Self::NotWhitelisted => "NOT_WHITELISTED",
            Self::Profanity => "PROFANITY",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub accept: bool,
    pub reason: Reason,
    /// Normalized name; empty when rejected before extraction.
    pub display_name: String,
}

impl Verdict {
    fn accept(display_name: String) -> Self {
        Self {
            accept: true,
            reason: Reason::Accepted,
            display_name,
        }
    }

    fn reject(reason: Reason, display_name: impl Into<String>) -> Self {
        Self {
            accept: false,
            reason,
            display_name: display_name.into(),
        }
    }
}

/// Pull a displayable name out of a message body.
///
/// Drops a leading greeting, keeps ASCII letters, whitespace and hyphens,
/// collapses whitespace, title-cases and cuts to `max_len` characters.
pub fn extract_name(body: &str, max_len: usize, fallback: &str) -> String {
    let stripped = greeting_re().replace(body.trim(), "");
    let kept: String = stripped
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || c.is_whitespace() || *c == '-')
        .collect();
    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return fallback.to_string();
    }
    let titled = title_case(&collapsed);
    let capped: String = titled.chars().take(max_len).collect();
    let capped = capped.trim_end().to_string();
    if capped.is_empty() {
        fallback.to_string()
    } else {
        capped
    }
}

/// Upper-case the first letter of every letter run, lower-case the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

fn is_valid_format(name: &str, config: &FilterConfig) -> bool {
    let words = name.split_whitespace().count();
    if config.one_word_only {
        if words != 1 {
            return false;
        }
    } else if config.two_words_max && words > 2 {
        return false;
    }
    name.chars().count() <= MAX_NAME_CHARS
}

pub struct MessageFilter {
    config: FilterConfig,
    policy: Arc<PolicyStore>,
    ledger: Arc<RateLedger>,
}

impl MessageFilter {
    pub fn new(config: FilterConfig, policy: Arc<PolicyStore>, ledger: Arc<RateLedger>) -> Self {
        Self {
            config,
            policy,
            ledger,
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<RateLedger> {
        &self.ledger
    }

    /// Evaluate against today's local calendar day.
    pub fn evaluate(&self, msg: &InboundMessage) -> Verdict {
        self.evaluate_on(msg, Local::now().date_naive())
    }

    pub fn evaluate_on(&self, msg: &InboundMessage, day: NaiveDate) -> Verdict {
        let phone = msg.from_phone.as_str();
        let masked = crate::utils::mask_phone(phone);

        if self.policy.is_phone_blocked(phone) {
            info!("rejected message from blocked phone {}", masked);
            return Verdict::reject(Reason::PhoneBlocked, "");
        }

        let limit = self.config.max_messages_per_phone;
        if limit > 0 && self.ledger.count(phone, day) >= limit {
            info!("rate limited {} ({} per day)", masked, limit);
            return Verdict::reject(Reason::RateLimited, "");
        }

        let name = extract_name(
            &msg.body,
            self.config.max_message_length,
            &self.config.fallback_name,
        );
        debug!("extracted name '{}' from {}", name, masked);

        if !is_valid_format(&name, &self.config) {
            info!("rejected invalid name format '{}' from {}", name, masked);
            return Verdict::reject(Reason::InvalidFormat, name);
        }

        if self.config.reject_duplicate_names && self.ledger.has_name(phone, day, &name) {
            info!("duplicate name '{}' from {} today", name, masked);
            return Verdict::reject(Reason::Duplicate, name);
        }

        if self.config.use_whitelist
            && !self.policy.whitelist_is_empty()
            && !self.policy.is_whitelisted(&name)
        {
            info!("rejected name not on whitelist: '{}'", name);
            return Verdict::reject(Reason::NotWhitelisted, name);
        }

        if self.config.profanity_filter && self.contains_profanity(&name, &msg.body) {
            info!("rejected profanity from {}", masked);
            return Verdict::reject(Reason::Profanity, name);
        }

        match self.ledger.try_record(
            phone,
            day,
            &name,
            limit,
            self.config.reject_duplicate_names,
        ) {
            RecordOutcome::Recorded(count) => {
                debug!("{} has {} accepted message(s) today", masked, count);
                Verdict::accept(name)
            }
            RecordOutcome::RateLimited => Verdict::reject(Reason::RateLimited, name),
            RecordOutcome::Duplicate => Verdict::reject(Reason::Duplicate, name),
        }
    }

    fn contains_profanity(&self, name: &str, body: &str) -> bool {
        name.split(|c: char| c.is_whitespace() || c == '-')
            .filter(|t| !t.is_empty())
            .any(|token| self.policy.is_blacklisted(token))
            || self.policy.find_blacklisted(body).is_some()
    }

    /// Return an accepted message's budget, e.g. when the queue refused it.
    pub fn release(&self, phone: &str, day: NaiveDate, name: &str) {
        self.ledger.release(phone, day, name);
    }
}

#[cfg(test)]
mod tests;
