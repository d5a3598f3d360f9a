//! The handler `serialbot serve` runs for every chat.

use std::sync::Arc;

use sb_dispatch::{Event, Handler};
use sb_telegram::{BotApi, Update};

/// Replies to each text message with its own text and logs button presses.
pub struct EchoHandler {
    bot: Arc<dyn BotApi>,
}

impl EchoHandler {
    pub fn new(bot: Arc<dyn BotApi>) -> Self {
        Self { bot }
    }
}

#[async_trait::async_trait]
impl Handler<Update> for EchoHandler {
    async fn handle(&self, event: Event<Update>) -> anyhow::Result<()> {
        let session_key = event.session_key.clone();
        let update = event.into_payload();

        if let Some(query) = &update.callback_query {
            tracing::info!(
                session_key = %session_key,
                callback_id = %query.id,
                data = query.data.as_deref().unwrap_or(""),
                "callback query received"
            );
            return Ok(());
        }

        let Some(message) = update.message.as_ref() else {
            tracing::debug!(session_key = %session_key, update_id = update.update_id, "nothing to echo");
            return Ok(());
        };
        let Some(text) = message.text.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(());
        };

        let reply = if message.has_command("start") {
            message.create_reply("Hi! Send me anything and I will send it back.")
        } else {
            message.create_reply(text)
        };
        let sent = self.bot.send_message(&reply).await?;
        tracing::debug!(
            session_key = %session_key,
            update_id = update.update_id,
            message_id = sent.message_id,
            "echo sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sb_domain::error::{Error, Result};
    use sb_telegram::{Message, SendMessageRequest, SetWebhookRequest, WebhookInfo};

    #[derive(Default)]
    struct RecordingBot {
        sent: Mutex<Vec<SendMessageRequest>>,
    }

    #[async_trait::async_trait]
    impl BotApi for RecordingBot {
        async fn set_webhook(&self, _request: &SetWebhookRequest) -> Result<bool> {
            Ok(true)
        }
        async fn delete_webhook(&self) -> Result<bool> {
            Ok(true)
        }
        async fn get_webhook_info(&self) -> Result<WebhookInfo> {
            Ok(WebhookInfo::default())
        }
        async fn send_message(&self, request: &SendMessageRequest) -> Result<Message> {
            self.sent.lock().push(request.clone());
            serde_json::from_value(serde_json::json!({
                "message_id": 1,
                "chat": {"id": request.chat_id, "type": "private"},
                "date": 0,
                "text": request.text,
            }))
            .map_err(Error::from)
        }
        fn token(&self) -> &str {
            "test"
        }
    }

    fn event(json: serde_json::Value) -> Event<Update> {
        Event::from_routable(serde_json::from_value::<Update>(json).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn echoes_text_as_reply() {
        let bot = Arc::new(RecordingBot::default());
        let handler = EchoHandler::new(bot.clone());
        handler
            .handle(event(serde_json::json!({
                "update_id": 1,
                "message": {"message_id": 12, "chat": {"id": 3, "type": "private"}, "date": 0, "text": "ping"}
            })))
            .await
            .unwrap();

        let sent = bot.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, 3);
        assert_eq!(sent[0].text, "ping");
        assert_eq!(sent[0].reply_to_message_id, Some(12));
    }

    #[tokio::test]
    async fn callback_queries_are_not_answered() {
        let bot = Arc::new(RecordingBot::default());
        let handler = EchoHandler::new(bot.clone());
        handler
            .handle(event(serde_json::json!({
                "update_id": 2,
                "callback_query": {
                    "id": "q",
                    "from": {"id": 1, "first_name": "A"},
                    "message": {"message_id": 4, "chat": {"id": 3, "type": "private"}, "date": 0},
                    "data": "x"
                }
            })))
            .await
            .unwrap();
        assert!(bot.sent.lock().is_empty());
    }
}
