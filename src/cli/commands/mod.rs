mod subcommands;


use crate::config::{Config, ResolvedPaths, load_config};
use crate::service::MarqueeService;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "marquee")]
#[command(about = "Text a name, see it on the lights")]
#[command(version)]
pub struct Cli {
    /// Config file (default: ~/.marquee/config.json)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default config and empty policy lists
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Run the poller, the display loop and the status API
    Run,
    /// Show configuration and persisted state
    Status,
    /// Dry-run a message body through the filter (nothing is queued or recorded)
    Check {
        /// Message body as it would arrive by SMS
        body: String,
        /// Sender phone number
        #[arg(long, default_value = "+15555550000")]
        from: String,
    },
    /// Block a phone number
    Block { phone: String },
    /// Unblock a phone number
    Unblock { phone: String },
    /// List blocked phone numbers
    Blocklist,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => crate::config::get_config_path()?,
    };
    let home = config_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    match cli.command {
        Commands::Init { force } => {
            init(&config_path, &home, force)?;
        }
        Commands::Run => {
            run_service(&config_path, &home).await?;
        }
        Commands::Status => {
            subcommands::status_command(&config_path, &home).await?;
        }
        Commands::Check { body, from } => {
            subcommands::check_command(&config_path, &home, &body, &from)?;
        }
        Commands::Block { phone } => {
            subcommands::block_command(&config_path, &home, &phone, true)?;
        }
        Commands::Unblock { phone } => {
            subcommands::block_command(&config_path, &home, &phone, false)?;
        }
        Commands::Blocklist => {
            subcommands::blocklist_command(&config_path, &home)?;
        }
    }

    Ok(())
}

fn load(config_path: &Path, home: &Path) -> Result<(Config, ResolvedPaths)> {
    let config = load_config(Some(config_path))?;
    let paths = config.paths.resolve(home);
    Ok((config, paths))
}

fn init(config_path: &Path, home: &Path, force: bool) -> Result<()> {
    println!("\u{1f384} Initializing marquee...");

    if config_path.exists() && !force {
        println!(
            "\u{26a0}\u{fe0f}  Config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    } else {
        let config = Config::default();
        crate::config::save_config(&config, Some(config_path))?;
        println!("\u{2713} Created config at {}", config_path.display());
    }

    let config = load_config(Some(config_path))?;
    let paths = config.paths.resolve(home);
    create_policy_templates(&paths)?;
    println!("\u{2713} Policy lists under {}", home.display());

    println!("\nNext steps:");
    println!("  1. Add your Twilio credentials to {}", config_path.display());
    println!("     (or set MARQUEE_TWILIO_ACCOUNT_SID / MARQUEE_TWILIO_AUTH_TOKEN)");
    println!("  2. Set display.fppHost and \"enabled\": true");
    println!("  3. marquee run");

    Ok(())
}

/// Write starter policy files. Existing files are left alone.
fn create_policy_templates(paths: &ResolvedPaths) -> Result<()> {
    let templates = [
        (
            &paths.blacklist,
            "# Words that keep a text off the display, one per line.\n# Lines starting with # are ignored.\n",
        ),
        (
            &paths.whitelist,
            "# Approved names, one per line. Only used when filter.useWhitelist is on.\n",
        ),
        (&paths.blocked_phones, "[]\n"),
    ];
    for (path, content) in templates {
        if path.exists() {
            continue;
        }
        crate::utils::atomic_write(path, content)
            .with_context(|| format!("failed to create {}", path.display()))?;
    }
    crate::utils::ensure_dir(&paths.state_dir)?;
    Ok(())
}

async fn run_service(config_path: &Path, home: &Path) -> Result<()> {
    info!("Loading configuration...");
    let (config, _) = load(config_path, home)?;
    let status = config.status.clone();
    let enabled = config.enabled;

    if !enabled && !status.enabled {
        anyhow::bail!("marquee is disabled and the status API is off; nothing to run");
    }

    let service = Arc::new(MarqueeService::from_config(config, home)?);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let http_task = if status.enabled {
        let handle = crate::gateway::start(
            &status.host,
            status.port,
            Arc::clone(&service),
            shutdown_rx,
        )
        .await?;
        println!("Status API listening on {}:{}", status.host, status.port);
        Some(handle)
    } else {
        info!("status API disabled");
        None
    };

    if enabled {
        service.start().await?;
        println!("\u{1f384} marquee is running");
    } else {
        warn!("marquee is disabled; only the status API is up");
        println!("marquee is disabled; serving status only");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    println!("\nShutting down...");

    service.stop().await;
    let _ = shutdown_tx.send(true);
    if let Some(handle) = http_task {
        let _ = handle.await;
    }
    Ok(())
}
