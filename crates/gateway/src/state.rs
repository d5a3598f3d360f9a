use std::sync::Arc;

use sb_dispatch::SessionRegistry;
use sb_domain::config::Config;
use sb_telegram::{BotApi, Update};

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Per-chat update queues fed by the webhook and drained by the
    /// dispatcher.
    pub registry: Arc<SessionRegistry<Update>>,
    pub bot: Arc<dyn BotApi>,

    // ── Security ──────────────────────────────────────────────────────
    /// SHA-256 of the bearer token for `/v1/*`; `None` disables auth.
    pub api_token_hash: Option<Vec<u8>>,
    /// SHA-256 of the webhook secret token; `None` accepts any delivery.
    pub webhook_secret_hash: Option<Vec<u8>>,
}
