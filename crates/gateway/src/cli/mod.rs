pub mod config;
pub mod webhook;

use anyhow::Context;
use clap::{Parser, Subcommand};

/// SerialBot: a Telegram webhook gateway with per-chat ordered delivery.
#[derive(Debug, Parser)]
#[command(name = "serialbot", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Inspect or change the webhook registered with the Bot API.
    #[command(subcommand)]
    Webhook(WebhookCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

#[derive(Debug, Subcommand)]
pub enum WebhookCommand {
    /// Show what the Bot API currently has registered.
    Info,
    /// Register the configured `webhook_url` (or the given URL).
    Set {
        /// Override `telegram.webhook_url`.
        #[arg(long)]
        url: Option<String>,
    },
    /// Remove the registered webhook.
    Delete,
}

/// Path of the config file: `SB_CONFIG`, else `config.toml`.
pub fn config_path() -> String {
    std::env::var("SB_CONFIG").unwrap_or_else(|_| "config.toml".into())
}

/// Load the config named by [`config_path`].  A missing file yields the
/// defaults.
pub fn load_config() -> anyhow::Result<(sb_domain::config::Config, String)> {
    let config_path = config_path();
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<sb_domain::config::Config> {
    if !std::path::Path::new(config_path).exists() {
        return Ok(sb_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(config_path)
        .with_context(|| format!("reading {config_path}"))?;
    toml::from_str(&raw).with_context(|| format!("parsing {config_path}"))
}
