//! Telegram Bot API types and client.

pub mod client;
pub mod types;

pub use client::{BotApi, TelegramClient};
pub use types::{
    ApiResponse, CallbackQuery, Chat, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton,
    Message, MessageEntity, MessageEntityType, ParseMode, ReplyKeyboardMarkup, ReplyMarkup,
    SendMessageRequest, SetWebhookRequest, Update, User, WebhookInfo,
};
