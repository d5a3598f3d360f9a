//! Outbound Bot API client.

use std::time::{Duration, Instant};

use sb_domain::config::TelegramConfig;
use sb_domain::error::{Error, Result};
use sb_domain::trace::TraceEvent;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::{ApiResponse, Message, SendMessageRequest, SetWebhookRequest, WebhookInfo};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The Bot API methods the gateway uses.
#[async_trait::async_trait]
pub trait BotApi: Send + Sync {
    async fn set_webhook(&self, request: &SetWebhookRequest) -> Result<bool>;

    async fn delete_webhook(&self) -> Result<bool>;

    async fn get_webhook_info(&self) -> Result<WebhookInfo>;

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message>;

    /// The bot token this client authenticates with.
    fn token(&self) -> &str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// reqwest implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TelegramClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl TelegramClient {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::Auth("bot token is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    /// Build a client from config, reading the token from `token_env`.
    pub fn from_config(cfg: &TelegramConfig) -> Result<Self> {
        let token = std::env::var(&cfg.token_env).map_err(|_| {
            Error::Auth(format!(
                "environment variable '{}' not set or not valid UTF-8",
                cfg.token_env
            ))
        })?;
        Self::new(
            &cfg.api_base_url,
            token,
            Duration::from_secs(cfg.request_timeout_secs),
        )
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// POST `body` to `method` and unwrap the response envelope.
    async fn call<B, T>(&self, method: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let started = Instant::now();
        let result = self.call_inner(method, body).await;
        TraceEvent::BotApiCall {
            method: method.to_owned(),
            ok: result.is_ok(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();
        result
    }

    async fn call_inner<B, T>(&self, method: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        tracing::debug!(method, "bot api request");

        let mut req = self
            .client
            .post(self.method_url(method))
            .header("cache-control", "no-cache");
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(from_reqwest)?;
        let status = resp.status();
        let text = resp.text().await.map_err(from_reqwest)?;

        // Bot API errors come back as a JSON envelope with a 4xx status,
        // so the envelope is read before the status.
        let envelope: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(Error::Http(format!("HTTP {} - {}", status.as_u16(), text)));
            }
            Err(e) => return Err(Error::Json(e)),
        };

        if !envelope.ok {
            let description = envelope
                .description
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            tracing::warn!(method, %description, "bot api call rejected");
            return Err(Error::Api {
                method: method.to_owned(),
                description,
            });
        }

        envelope.result.ok_or_else(|| Error::Api {
            method: method.to_owned(),
            description: "response has no result".into(),
        })
    }
}

#[async_trait::async_trait]
impl BotApi for TelegramClient {
    async fn set_webhook(&self, request: &SetWebhookRequest) -> Result<bool> {
        self.call("setWebhook", Some(request)).await
    }

    async fn delete_webhook(&self) -> Result<bool> {
        self.call::<(), _>("deleteWebhook", None).await
    }

    async fn get_webhook_info(&self) -> Result<WebhookInfo> {
        self.call::<(), _>("getWebhookInfo", None).await
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message> {
        self.call("sendMessage", Some(request)).await
    }

    fn token(&self) -> &str {
        &self.token
    }
}

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// The request URL embeds the bot token, so it is stripped first.
fn from_reqwest(e: reqwest::Error) -> Error {
    let e = e.without_url();
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}
