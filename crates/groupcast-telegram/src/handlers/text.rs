use std::sync::Arc;

use teloxide::prelude::*;

use groupcast_core::domain::{ChatKind, UserId};

use crate::router::AppState;

use super::{chat_kind, menu::send_chunked, user_id_of};

pub async fn handle_text(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text().map(|s| s.to_string()) else {
        return Ok(());
    };
    let user_id = user_id_of(user.id);

    if chat_kind(&msg.chat) != ChatKind::Private {
        tracing::debug!(user = %user_id, chat = msg.chat.id.0, "group message ignored");
        return Ok(());
    }

    let waiting = match state.store.user_state(user_id).await {
        Ok(s) => s.waiting_for_broadcast,
        Err(e) => {
            tracing::error!(user = %user_id, "failed to read user state: {e}");
            false
        }
    };
    if !waiting {
        bot.send_message(
            msg.chat.id,
            "Use /start to see the main menu or /broadcast to send a message.",
        )
        .await?;
        return Ok(());
    }

    // Clear first so messages sent while the campaign runs are not broadcast too.
    if let Err(e) = state.store.set_waiting_for_broadcast(user_id, false).await {
        tracing::error!(user = %user_id, "failed to clear broadcast flag: {e}");
    }

    tracing::info!(user = %user_id, len = text.len(), "broadcast requested");
    bot.send_message(
        msg.chat.id,
        "Broadcasting to all groups. You will get a report when it finishes.",
    )
    .await?;

    // A campaign can take minutes; updates for this chat keep flowing meanwhile.
    tokio::spawn(run_campaign(bot, msg.chat.id, user_id, text, state));
    Ok(())
}

async fn run_campaign(
    bot: Bot,
    chat_id: teloxide::types::ChatId,
    user_id: UserId,
    text: String,
    state: Arc<AppState>,
) {
    let reply = match state.broadcaster.run_broadcast(&text).await {
        Ok(report) => report.render(),
        Err(e) => {
            tracing::error!(user = %user_id, "broadcast failed: {e}");
            "An error occurred during the broadcast operation.".to_string()
        }
    };
    if let Err(e) = send_chunked(&bot, chat_id, &reply, state.cfg.telegram_safe_limit).await {
        tracing::error!(user = %user_id, "failed to deliver broadcast report: {e}");
    }
}
