//! Telegram update handlers.
//!
//! Each handler is a small adapter that:
//! - checks authorization against the env allow list and the store
//! - maps the update onto `groupcast-core` (menus, store, broadcast manager)
//! - renders the answer back to Telegram

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Chat, ChatMemberUpdated, Message},
};

use groupcast_core::{
    domain::{ChatKind, UserId},
    security::is_authorized,
};

use crate::router::AppState;

mod callback;
mod chat_member;
mod commands;
mod menu;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_my_chat_member(
    upd: ChatMemberUpdated,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    chat_member::handle_my_chat_member(upd, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let user_id = msg.from().map(|u| user_id_of(u.id));

    if !is_authorized(
        user_id,
        &state.cfg.telegram_allowed_users,
        state.store.as_ref(),
    )
    .await
    {
        tracing::debug!(chat = msg.chat.id.0, "ignored message from unauthorized user");
        return Ok(());
    }

    if text.starts_with('/') {
        return commands::handle_command(bot, msg, state).await;
    }
    text::handle_text(bot, msg, state).await
}

pub(crate) fn user_id_of(id: teloxide::types::UserId) -> UserId {
    UserId(id.0 as i64)
}

pub(crate) fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Group
    }
}
