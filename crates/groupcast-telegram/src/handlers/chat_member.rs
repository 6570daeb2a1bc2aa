use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{ChatMemberKind, ChatMemberUpdated},
};

use groupcast_core::{
    domain::{ChatId, ChatKind},
    store::GroupRecord,
};

use crate::router::AppState;

use super::chat_kind;

#[derive(Debug, PartialEq, Eq)]
enum Membership {
    Admin,
    Member,
    Gone,
}

fn membership(kind: &ChatMemberKind) -> Membership {
    match kind {
        ChatMemberKind::Owner(_) | ChatMemberKind::Administrator(_) => Membership::Admin,
        ChatMemberKind::Left | ChatMemberKind::Banned(_) => Membership::Gone,
        _ => Membership::Member,
    }
}

/// Track the groups the bot is in, and whether it can post there as admin.
pub async fn handle_my_chat_member(
    upd: ChatMemberUpdated,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    // Private chats report the user blocking the bot; nothing to track.
    if chat_kind(&upd.chat) == ChatKind::Private {
        return Ok(());
    }

    let chat = ChatId(upd.chat.id.0);
    let result = match membership(&upd.new_chat_member.kind) {
        Membership::Gone => state.store.remove_group(chat).await.map(|known| {
            tracing::info!(%chat, known, "bot removed from group");
        }),
        m => {
            let record = GroupRecord {
                name: upd.chat.title().unwrap_or("Unnamed Group").to_string(),
                is_admin: m == Membership::Admin,
            };
            tracing::info!(%chat, is_admin = record.is_admin, "bot added to group");
            state.store.upsert_group(chat, record).await
        }
    };

    if let Err(e) = result {
        tracing::error!(%chat, "failed to update group record: {e}");
    }
    Ok(())
}
