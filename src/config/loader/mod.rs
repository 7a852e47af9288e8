use crate::config::Config;
use crate::utils::{ensure_dir, get_marquee_home};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[allow(unused_imports)]
use tracing::{info, warn};

/// Flat keys of the legacy plugin config and the nested path each maps to.
const LEGACY_KEYS: &[(&str, &str, &str)] = &[
    ("twilio_account_sid", "twilio", "accountSid"),
    ("twilio_auth_token", "twilio", "authToken"),
    ("twilio_phone_number", "twilio", "phoneNumber"),
    ("poll_interval", "polling", "intervalSecs"),
    ("display_duration", "display", "durationSecs"),
    ("fpp_host", "display", "fppHost"),
    ("name_display_playlist", "display", "nameDisplayPlaylist"),
    ("overlay_model_name", "display", "overlayModelName"),
    ("text_color", "display", "textColor"),
    ("text_font", "display", "textFont"),
    ("text_font_size", "display", "textFontSize"),
    ("text_position", "display", "textPosition"),
    ("scroll_speed", "display", "scrollSpeed"),
    ("message_template", "display", "messageTemplate"),
    ("max_messages_per_phone", "filter", "maxMessagesPerPhone"),
    ("max_message_length", "filter", "maxMessageLength"),
    ("max_message_age_mins", "filter", "maxMessageAgeMins"),
    ("one_word_only", "filter", "oneWordOnly"),
    ("two_words_max", "filter", "twoWordsMax"),
    ("use_whitelist", "filter", "useWhitelist"),
    ("profanity_filter", "filter", "profanityFilter"),
    ("send_sms_responses", "responses", "enabled"),
    ("response_success", "responses", "success"),
    ("response_profanity", "responses", "profanity"),
    ("response_blocked", "responses", "blocked"),
    ("response_rate_limited", "responses", "rateLimited"),
    ("response_duplicate", "responses", "duplicate"),
    ("response_invalid_format", "responses", "invalidFormat"),
    ("response_not_whitelisted", "responses", "notWhitelisted"),
];

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_marquee_home()?.join("config.json"))
}

pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    if path.exists() {
        // Shared (read) lock: concurrent readers are fine, writers wait
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open config at {}", path.display()))?;
        file.lock_shared()
            .with_context(|| "Failed to acquire shared lock on config file")?;

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut data: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?;

        data = migrate_config(data);

        let mut config: Config =
            serde_json::from_value(data).with_context(|| "Failed to deserialize config")?;

        crate::config::credentials::apply_env_overrides(&mut config);

        check_file_permissions(path);

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        return Ok(config);
    }

    let mut default_config = Config::default();
    crate::config::credentials::apply_env_overrides(&mut default_config);
    default_config
        .validate()
        .with_context(|| "Default configuration validation failed")?;
    Ok(default_config)
}

/// Warn if the config file (which may hold the Twilio auth token) is readable
/// by group or others. Only emits once per process.
#[cfg(unix)]
fn check_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Once;

    static WARNED: Once = Once::new();
    WARNED.call_once(|| {
        if let Ok(meta) = std::fs::metadata(path) {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "config file {} has permissions {:o}: recommend 0600",
                    path.display(),
                    mode & 0o777
                );
            }
        }
    });
}

#[cfg(not(unix))]
fn check_file_permissions(_path: &Path) {}

/// Lift the flat key layout of the legacy plugin config into sections.
///
/// Keys already present in a section win over their legacy counterparts.
fn migrate_config(data: Value) -> Value {
    let Value::Object(mut map) = data else {
        return data;
    };

    let mut migrated = 0usize;
    for (legacy, section, key) in LEGACY_KEYS {
        let Some(value) = map.remove(*legacy) else {
            continue;
        };
        let entry = map
            .entry((*section).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(section_map) = entry
            && !section_map.contains_key(*key)
        {
            section_map.insert((*key).to_string(), value);
            migrated += 1;
        }
    }
    if migrated > 0 {
        info!("migrated {} legacy config keys into sections", migrated);
    }
    Value::Object(map)
}

pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<()> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    ensure_dir(path.parent().context("Config path has no parent")?)?;

    // atomic_write() renames over the config, so the flock lives on a
    // separate .lock file that survives the rename.
    let lock_path = path.with_extension("json.lock");
    let lock_file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to create lock file at {}", lock_path.display()))?;
    lock_file
        .lock_exclusive()
        .with_context(|| "Failed to acquire exclusive lock on config lock file")?;

    let content = serde_json::to_string_pretty(config)?;
    crate::utils::atomic_write(path, &content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }

    Ok(())
}
