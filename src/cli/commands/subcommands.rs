use super::load;
use anyhow::Result;
use chrono::{Local, Utc};
use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, DisplayConfig, ResolvedPaths};
use crate::config::credentials::{CREDENTIAL_NAMES, detect_source};
use crate::display::FppClient;
use crate::filter::{MessageFilter, Verdict};
use crate::ledger::RateLedger;
use crate::message_log::MessageLog;
use crate::policy::PolicyStore;
use crate::provider::InboundMessage;

fn mark(ok: bool) -> &'static str {
    if ok { "\u{2713}" } else { "\u{2717}" }
}

/// One-line FPP reachability report for `marquee status`.
pub(super) async fn fpp_line(display: &DisplayConfig) -> String {
    match FppClient::new(display.clone()).ping().await {
        Ok(()) => format!("{} {}", display.fpp_host, mark(true)),
        Err(e) => format!("{} {} ({})", display.fpp_host, mark(false), e),
    }
}

pub(super) async fn status_command(config_path: &Path, home: &Path) -> Result<()> {
    let (config, paths) = load(config_path, home)?;

    println!("\u{1f384} marquee Status\n");
    println!("Config: {} {}", config_path.display(), mark(config_path.exists()));
    println!("Enabled: {}", if config.enabled { "yes" } else { "no" });
    println!(
        "Twilio number: {}",
        if config.twilio.phone_number.is_empty() {
            "not set"
        } else {
            config.twilio.phone_number.as_str()
        }
    );
    for name in CREDENTIAL_NAMES {
        println!("  {}: {}", name, detect_source(name, &config));
    }
    println!("FPP host: {}", fpp_line(&config.display).await);
    println!(
        "Status API: {}",
        if config.status.enabled {
            format!("{}:{}", config.status.host, config.status.port)
        } else {
            "disabled".to_string()
        }
    );

    let policy = PolicyStore::from_paths(&paths);
    policy.reload_if_changed();
    println!("\nPolicy lists:");
    for f in policy.freshness() {
        println!(
            "  {:?}: {} entries {} ({})",
            f.list,
            f.entries,
            mark(f.available),
            f.source
        );
    }

    println!("\nState: {}", paths.state_dir.display());
    for (label, path) in [
        ("cursor", paths.cursor_file()),
        ("seen messages", paths.seen_file()),
        ("rate ledger", paths.ledger_file()),
        ("message log", paths.message_log_file()),
    ] {
        println!("  {}: {}", label, mark(path.exists()));
    }

    let entries = MessageLog::open(&paths.message_log_file()).entries();
    if !entries.is_empty() {
        println!("\nRecent messages:");
        for entry in entries.iter().take(10) {
            println!(
                "  {} {} '{}' -> {:?}",
                entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                crate::utils::mask_phone(&entry.phone),
                entry.extracted_name,
                entry.status
            );
        }
    }
    Ok(())
}

/// Evaluate `body` against the current lists with an empty rate ledger.
pub(super) fn dry_run(
    config: &Config,
    paths: &ResolvedPaths,
    body: &str,
    from: &str,
) -> Verdict {
    let policy = Arc::new(PolicyStore::from_paths(paths));
    policy.reload_if_changed();
    let filter = MessageFilter::new(
        config.filter.clone(),
        policy,
        Arc::new(RateLedger::in_memory()),
    );
    filter.evaluate(&InboundMessage {
        provider_message_id: "dry-run".into(),
        from_phone: from.to_string(),
        body: body.to_string(),
        received_at: Utc::now(),
    })
}

pub(super) fn check_command(
    config_path: &Path,
    home: &Path,
    body: &str,
    from: &str,
) -> Result<()> {
    let (config, paths) = load(config_path, home)?;
    let verdict = dry_run(&config, &paths, body, from);
    if verdict.accept {
        println!("\u{2713} accepted: would display '{}'", verdict.display_name);
    } else {
        println!(
            "\u{2717} rejected ({}): '{}'",
            verdict.reason, verdict.display_name
        );
    }
    println!("(rate limits are not checked in a dry run)");
    Ok(())
}

pub(super) fn block_command(
    config_path: &Path,
    home: &Path,
    phone: &str,
    block: bool,
) -> Result<()> {
    let (_, paths) = load(config_path, home)?;
    let policy = PolicyStore::from_paths(&paths);
    policy.reload_if_changed();
    let phone = phone.trim();
    if phone.is_empty() {
        anyhow::bail!("phone number is empty");
    }
    let changed = if block {
        policy.block_phone(phone)?
    } else {
        policy.unblock_phone(phone)?
    };
    match (block, changed) {
        (true, true) => println!("\u{2713} Blocked {}", phone),
        (true, false) => println!("{} was already blocked", phone),
        (false, true) => println!("\u{2713} Unblocked {}", phone),
        (false, false) => println!("{} was not blocked", phone),
    }
    Ok(())
}

pub(super) fn blocklist_command(config_path: &Path, home: &Path) -> Result<()> {
    let (_, paths) = load(config_path, home)?;
    let policy = PolicyStore::from_paths(&paths);
    policy.reload_if_changed();
    let phones = policy.blocked_phones();
    if phones.is_empty() {
        println!("No blocked phones.");
        return Ok(());
    }
    println!("Blocked phones ({}):", phones.len());
    for phone in phones {
        println!("  {}", phone);
    }
    Ok(())
}
