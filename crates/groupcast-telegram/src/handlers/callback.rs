use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};

use groupcast_core::{
    domain::ChatKind,
    menu::{function_menu, MenuAction},
    security::is_authorized,
};

use crate::{router::AppState, to_markup};

use super::{
    chat_kind,
    commands::{BROADCAST_PROMPT, PRIVATE_ONLY},
    menu::{build_main_menu, MainMenu, MAIN_MENU_PROMPT},
    user_id_of,
};

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let user_id = user_id_of(q.from.id);

    if !is_authorized(
        Some(user_id),
        &state.cfg.telegram_allowed_users,
        state.store.as_ref(),
    )
    .await
    {
        tracing::info!(user = %user_id, "unauthorized callback query");
        let _ = bot
            .answer_callback_query(cb_id)
            .text("You are not authorized to use this bot.")
            .await;
        return Ok(());
    }

    // Menus only exist on messages the bot sent; anything else gets a bare answer.
    let (Some(message), Some(action)) = (
        q.message.as_ref(),
        q.data.as_deref().and_then(MenuAction::parse),
    ) else {
        let _ = bot.answer_callback_query(cb_id).await;
        return Ok(());
    };

    tracing::debug!(user = %user_id, ?action, "callback query");
    if let Err(e) = run_action(&bot, &q, message, action, &state).await {
        tracing::error!(user = %user_id, "callback query failed: {e}");
        let _ = bot
            .answer_callback_query(cb_id)
            .text("An error occurred while processing your request.")
            .await;
    }
    Ok(())
}

async fn run_action(
    bot: &Bot,
    q: &CallbackQuery,
    message: &Message,
    action: MenuAction,
    state: &AppState,
) -> anyhow::Result<()> {
    let chat_id = message.chat.id;
    let kind = chat_kind(&message.chat);

    match action {
        MenuAction::Category(category) => {
            let functions = state.store.category_functions(&category).await?;
            if functions.is_empty() {
                bot.answer_callback_query(q.id.clone())
                    .text("No functions available in this category.")
                    .await?;
                return Ok(());
            }
            let markup = to_markup(&function_menu(&category, &functions));
            let prompt = format!("Select a function from {category}:");
            bot.edit_message_text(chat_id, message.id, prompt)
                .reply_markup(markup)
                .await?;
            bot.answer_callback_query(q.id.clone()).await?;
        }

        MenuAction::Function { category, function } => {
            match state.store.function_response(&category, &function).await? {
                Some(response) => {
                    bot.answer_callback_query(q.id.clone()).await?;
                    bot.send_message(chat_id, response).await?;
                    bot.delete_message(chat_id, message.id).await?;
                }
                None => {
                    tracing::info!(%category, %function, "no response configured");
                    bot.answer_callback_query(q.id.clone())
                        .text("No response available for this function.")
                        .await?;
                }
            }
        }

        MenuAction::Broadcast => {
            if kind != ChatKind::Private {
                bot.answer_callback_query(q.id.clone())
                    .text(PRIVATE_ONLY)
                    .await?;
                return Ok(());
            }
            state
                .store
                .set_waiting_for_broadcast(user_id_of(q.from.id), true)
                .await?;
            bot.answer_callback_query(q.id.clone()).await?;
            bot.send_message(chat_id, BROADCAST_PROMPT).await?;
        }

        MenuAction::BackToMain => {
            bot.answer_callback_query(q.id.clone()).await?;
            match build_main_menu(state, kind).await? {
                MainMenu::Keyboard(markup) => {
                    bot.edit_message_text(chat_id, message.id, MAIN_MENU_PROMPT)
                        .reply_markup(markup)
                        .await?;
                }
                MainMenu::Empty => {
                    bot.edit_message_text(chat_id, message.id, "No categories available.")
                        .await?;
                }
            }
        }

        MenuAction::CloseMenu => {
            bot.answer_callback_query(q.id.clone()).await?;
            bot.delete_message(chat_id, message.id).await?;
        }
    }
    Ok(())
}
