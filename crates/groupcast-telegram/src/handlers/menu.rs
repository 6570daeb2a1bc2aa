use teloxide::prelude::*;

use groupcast_core::{domain::ChatKind, formatting::split_text_chunks, menu::main_menu};

use crate::{router::AppState, to_markup};

pub(super) const MAIN_MENU_PROMPT: &str = "Please choose a category:";

/// What the main menu should show for this chat.
pub(super) enum MainMenu {
    Keyboard(teloxide::types::InlineKeyboardMarkup),
    Empty,
}

pub(super) async fn build_main_menu(state: &AppState, kind: ChatKind) -> anyhow::Result<MainMenu> {
    let categories = state.store.categories().await?;
    if categories.is_empty() {
        return Ok(MainMenu::Empty);
    }
    let keyboard = main_menu(&categories, kind == ChatKind::Private);
    Ok(MainMenu::Keyboard(to_markup(&keyboard)))
}

/// Send the main menu as a new message.
pub(super) async fn show_main_menu(
    bot: &Bot,
    chat_id: teloxide::types::ChatId,
    state: &AppState,
    kind: ChatKind,
) -> ResponseResult<()> {
    match build_main_menu(state, kind).await {
        Ok(MainMenu::Keyboard(markup)) => {
            bot.send_message(chat_id, MAIN_MENU_PROMPT)
                .reply_markup(markup)
                .await?;
        }
        Ok(MainMenu::Empty) => {
            tracing::info!("no categories configured");
            bot.send_message(chat_id, "No categories available.").await?;
        }
        Err(e) => {
            tracing::error!("failed to load categories: {e}");
            bot.send_message(chat_id, "An error occurred while fetching categories.")
                .await?;
        }
    }
    Ok(())
}

/// Send long text as several messages under the Telegram size limit.
pub(super) async fn send_chunked(
    bot: &Bot,
    chat_id: teloxide::types::ChatId,
    text: &str,
    limit: usize,
) -> ResponseResult<()> {
    for chunk in split_text_chunks(text, limit) {
        bot.send_message(chat_id, chunk).await?;
    }
    Ok(())
}
