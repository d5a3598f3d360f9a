use serde::{Deserialize, Serialize};
use url::Url;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Telegram Bot API connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bot API connection and webhook registration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Environment variable holding the bot token issued by BotFather.
    #[serde(default = "d_token_env")]
    pub token_env: String,

    /// Base URL of the Bot API.  Self-hosted Bot API servers and
    /// compatible relays go here.
    #[serde(default = "d_api_base_url")]
    pub api_base_url: String,

    /// Public HTTPS URL the provider should deliver updates to.
    /// Its path is also the route the gateway listens on.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Call `setWebhook` on startup when `webhook_url` is set.
    #[serde(default = "d_true")]
    pub register_webhook: bool,

    /// Maximum simultaneous webhook connections requested from the provider.
    #[serde(default)]
    pub max_connections: Option<u32>,

    /// Environment variable holding the webhook secret.  When set, the
    /// secret is registered with the provider and every delivery must echo
    /// it in `X-Telegram-Bot-Api-Secret-Token`.
    #[serde(default = "d_secret_token_env")]
    pub secret_token_env: String,

    /// Timeout for a single outbound Bot API request.
    #[serde(default = "d_30")]
    pub request_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token_env: d_token_env(),
            api_base_url: d_api_base_url(),
            webhook_url: None,
            register_webhook: true,
            max_connections: None,
            secret_token_env: d_secret_token_env(),
            request_timeout_secs: 30,
        }
    }
}

/// Route used for deliveries when no `webhook_url` is configured.
pub const DEFAULT_WEBHOOK_PATH: &str = "/telegram/webhook";

impl TelegramConfig {
    /// The path component of `webhook_url`, or [`DEFAULT_WEBHOOK_PATH`]
    /// when no usable URL or no path is configured.
    pub fn webhook_path(&self) -> String {
        self.webhook_url
            .as_deref()
            .and_then(|raw| parse_http_url(raw).ok())
            .map(|url| url.path().to_owned())
            .filter(|p| p.len() > 1)
            .unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.to_owned())
    }
}

/// Parse an absolute `http` or `https` URL that names a host.
pub fn parse_http_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL `{raw}`: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme `{}` in `{raw}`", url.scheme()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(format!("URL `{raw}` has no host"));
    }
    Ok(url)
}

// ── serde default helpers ───────────────────────────────────────────

fn d_token_env() -> String {
    "SB_TELEGRAM_TOKEN".into()
}
fn d_api_base_url() -> String {
    "https://api.telegram.org".into()
}
fn d_secret_token_env() -> String {
    "SB_WEBHOOK_SECRET".into()
}
fn d_true() -> bool {
    true
}
fn d_30() -> u64 {
    30
}
