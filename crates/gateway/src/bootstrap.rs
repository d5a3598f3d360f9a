//! AppState construction, webhook registration and dispatcher startup,
//! extracted from `main.rs`.

use std::sync::Arc;

use anyhow::Context;

use sb_dispatch::{eviction, Dispatcher, DispatcherHandle, DispatcherOptions, SessionRegistry, SharedHandler};
use sb_domain::config::{Config, ConfigSeverity, TelegramConfig};
use sb_domain::trace::TraceEvent;
use sb_telegram::{BotApi, SetWebhookRequest, TelegramClient};

use crate::api::auth::digest;
use crate::handler::EchoHandler;
use crate::state::AppState;

/// Validate config, build the Bot API client and the session registry,
/// and return a fully-wired [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Bot API client ───────────────────────────────────────────────
    let bot: Arc<dyn BotApi> = Arc::new(
        TelegramClient::from_config(&config.telegram).context("creating Bot API client")?,
    );
    tracing::info!(base_url = %config.telegram.api_base_url, "bot api client ready");

    // ── Session registry ─────────────────────────────────────────────
    let registry = Arc::new(SessionRegistry::new(config.dispatch.duplicate_policy));
    tracing::info!(
        duplicate_policy = ?config.dispatch.duplicate_policy,
        "session registry ready"
    );

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = {
        let env_var = &config.server.api_token_env;
        match read_secret(env_var) {
            Some(token) => {
                tracing::info!(source = %format!("env:{env_var}"), "API bearer-token auth enabled");
                Some(digest(&token))
            }
            None => {
                tracing::warn!("API bearer-token auth DISABLED; set the {env_var} env var");
                None
            }
        }
    };

    // ── Webhook secret ──────────────────────────────────────────────
    let webhook_secret_hash = {
        let env_var = &config.telegram.secret_token_env;
        match read_secret(env_var) {
            Some(secret) => {
                tracing::info!(source = %format!("env:{env_var}"), "webhook secret token check enabled");
                Some(digest(&secret))
            }
            None => {
                tracing::warn!("webhook secret token check DISABLED; set the {env_var} env var");
                None
            }
        }
    };

    Ok(AppState {
        config,
        registry,
        bot,
        api_token_hash,
        webhook_secret_hash,
    })
}

/// Point the provider at this gateway when configured to.  Any failure is
/// returned so `serve` can refuse to start half-registered.
pub async fn register_webhook(state: &AppState) -> anyhow::Result<()> {
    let tg = &state.config.telegram;
    if !tg.register_webhook {
        tracing::info!("webhook registration disabled");
        return Ok(());
    }
    let Some(request) = webhook_request(tg) else {
        tracing::info!("no webhook_url configured, skipping registration");
        return Ok(());
    };

    let accepted = state
        .bot
        .set_webhook(&request)
        .await
        .with_context(|| format!("registering webhook {}", request.url))?;
    if !accepted {
        anyhow::bail!("Bot API declined webhook {}", request.url);
    }

    tracing::info!(url = %request.url, max_connections = ?request.max_connections, "webhook registered");
    TraceEvent::WebhookRegistered {
        url: request.url.clone(),
        max_connections: request.max_connections,
    }
    .emit();
    Ok(())
}

/// The `setWebhook` request for `tg`, or `None` without a `webhook_url`.
pub fn webhook_request(tg: &TelegramConfig) -> Option<SetWebhookRequest> {
    let url = tg.webhook_url.clone()?;
    Some(SetWebhookRequest {
        url,
        max_connections: tg.max_connections,
        secret_token: read_secret(&tg.secret_token_env),
    })
}

/// Start the dispatch loop with the echo handler and the configured
/// eviction policy.
pub fn spawn_dispatcher(state: &AppState) -> DispatcherHandle {
    let dispatch = &state.config.dispatch;
    let options = DispatcherOptions::from(dispatch);
    tracing::info!(
        tick_ms = options.tick_interval.as_millis() as u64,
        max_in_flight = options.max_in_flight,
        eviction = ?dispatch.eviction.policy,
        "starting dispatcher"
    );

    Dispatcher::new(
        state.registry.clone(),
        SharedHandler::new(EchoHandler::new(state.bot.clone())),
    )
    .with_eviction(eviction::from_config(&dispatch.eviction))
    .with_options(options)
    .spawn()
}

fn read_secret(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok().filter(|v| !v.is_empty())
}
