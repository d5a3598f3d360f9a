//! `serialbot webhook ...`: one-shot Bot API calls.

use anyhow::Context;
use sb_domain::config::Config;
use sb_telegram::{BotApi, TelegramClient};

use crate::bootstrap::webhook_request;

pub async fn info(config: &Config) -> anyhow::Result<()> {
    let bot = client(config)?;
    let info = bot.get_webhook_info().await.context("getWebhookInfo")?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

pub async fn set(config: &Config, url: Option<String>) -> anyhow::Result<()> {
    let mut tg = config.telegram.clone();
    if url.is_some() {
        tg.webhook_url = url;
    }
    let request = webhook_request(&tg)
        .context("no webhook URL: set telegram.webhook_url or pass --url")?;

    let bot = client(config)?;
    let accepted = bot.set_webhook(&request).await.context("setWebhook")?;
    if !accepted {
        anyhow::bail!("Bot API declined webhook {}", request.url);
    }
    println!("Webhook set to {}", request.url);
    Ok(())
}

pub async fn delete(config: &Config) -> anyhow::Result<()> {
    let bot = client(config)?;
    bot.delete_webhook().await.context("deleteWebhook")?;
    println!("Webhook deleted");
    Ok(())
}

fn client(config: &Config) -> anyhow::Result<TelegramClient> {
    TelegramClient::from_config(&config.telegram).context("creating Bot API client")
}
