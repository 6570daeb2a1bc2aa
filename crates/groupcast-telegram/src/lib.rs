//! Telegram adapter (teloxide).
//!
//! This crate implements the `groupcast-core` delivery port over the Telegram
//! Bot API and hosts the update handlers.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup},
    RequestError,
};

pub mod handlers;
pub mod router;

use groupcast_core::{
    broadcast::{DeliveryClient, DeliveryError},
    domain::ChatId,
    menu::InlineKeyboard,
};

/// Delivers broadcast messages through the Bot API.
///
/// No retry here: the dispatcher's retry policy owns that decision.
#[derive(Clone)]
pub struct TelegramDeliveryClient {
    bot: Bot,
}

impl TelegramDeliveryClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl DeliveryClient for TelegramDeliveryClient {
    async fn send(&self, destination: ChatId, text: &str) -> Result<(), DeliveryError> {
        self.bot
            .send_message(tg_chat(destination), text.to_string())
            .await
            .map(|_| ())
            .map_err(classify_error)
    }
}

pub(crate) fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat_id.0)
}

/// Map a Bot API failure to a delivery error with an HTTP-style code.
///
/// Flood control becomes 429 (the only retriable code); "Forbidden" answers
/// (bot kicked, blocked) become 403; other API errors 400; transport
/// failures carry no code.
pub fn classify_error(e: RequestError) -> DeliveryError {
    match &e {
        RequestError::RetryAfter(_) => DeliveryError::rate_limited(e.to_string()),
        RequestError::Api(api) => {
            let description = api.to_string();
            let code = if description.contains("Forbidden") {
                403
            } else {
                400
            };
            DeliveryError::new(Some(code), description)
        }
        _ => DeliveryError::new(None, e.to_string()),
    }
}

pub(crate) fn to_markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback_data.clone()))
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}
