use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;

use groupcast_core::domain::ChatKind;

use crate::router::AppState;

use super::{chat_kind, menu::show_main_menu, user_id_of};

pub(super) const BROADCAST_PROMPT: &str = "Please type the message you want to broadcast:";
pub(super) const PRIVATE_ONLY: &str = "Broadcast messages can only be sent in direct messages.";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        return format!("{hours}h {mins}m {secs}s");
    }
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let user_id = user_id_of(user.id);
    let kind = chat_kind(&msg.chat);
    let (cmd, _arg) = parse_command(text);

    match cmd.as_str() {
        "start" => {
            tracing::info!(user = %user_id, chat = msg.chat.id.0, "/start");
            show_main_menu(&bot, msg.chat.id, &state, kind).await?;
            if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
                tracing::debug!("could not delete /start message: {e}");
            }
            Ok(())
        }

        "broadcast" => {
            if kind != ChatKind::Private {
                bot.send_message(msg.chat.id, PRIVATE_ONLY).await?;
                return Ok(());
            }
            match state.store.set_waiting_for_broadcast(user_id, true).await {
                Ok(()) => {
                    tracing::info!(user = %user_id, "waiting for broadcast message");
                    bot.send_message(msg.chat.id, BROADCAST_PROMPT).await?;
                }
                Err(e) => {
                    tracing::error!(user = %user_id, "failed to set broadcast flag: {e}");
                    bot.send_message(
                        msg.chat.id,
                        "An error occurred while processing your request.",
                    )
                    .await?;
                }
            }
            Ok(())
        }

        "cancel" => {
            let waiting = state
                .store
                .user_state(user_id)
                .await
                .map(|s| s.waiting_for_broadcast)
                .unwrap_or(false);
            if !waiting {
                bot.send_message(msg.chat.id, "Nothing to cancel.").await?;
                return Ok(());
            }
            if let Err(e) = state.store.set_waiting_for_broadcast(user_id, false).await {
                tracing::error!(user = %user_id, "failed to clear broadcast flag: {e}");
            }
            bot.send_message(msg.chat.id, "Broadcast cancelled.").await?;
            Ok(())
        }

        "status" => {
            let body = match broadcast_status(&state).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!("failed to read broadcast status: {e}");
                    "An error occurred while reading the broadcast status.".to_string()
                }
            };
            bot.send_message(msg.chat.id, body).await?;
            Ok(())
        }

        _ => {
            bot.send_message(
                msg.chat.id,
                "Commands:\n\
/start - Show the main menu\n\
/broadcast - Send a message to every group (direct messages only)\n\
/cancel - Cancel a pending broadcast\n\
/status - Show broadcast status",
            )
            .await?;
            Ok(())
        }
    }
}

async fn broadcast_status(state: &AppState) -> groupcast_core::Result<String> {
    let destinations = state.store.eligible_destinations().await?;
    let last = state.store.broadcast_state().await?;
    let rate = state.broadcaster.queue().rate().snapshot();

    let next = match state.broadcaster.cooldown_remaining(&last, Utc::now()) {
        Some(wait) => format!("in {}", format_duration(wait.as_secs())),
        None => "now".to_string(),
    };
    let last_finished = last
        .last_broadcast_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());

    Ok(format!(
        "Broadcast status\n\n\
Groups receiving broadcasts: {}\n\
Last broadcast finished: {last_finished}\n\
Next broadcast possible: {next}\n\
Queued deliveries: {}\n\
Current send delay: {} ms (failures in a row: {})",
        destinations.len(),
        state.broadcaster.queue().pending(),
        rate.current_delay.as_millis(),
        rate.consecutive_failures,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_with_bot_suffix_and_args() {
        assert_eq!(
            parse_command("/Broadcast@groupcast_bot  hello there"),
            ("broadcast".to_string(), "hello there".to_string())
        );
        assert_eq!(parse_command("/start"), ("start".to_string(), String::new()));
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(290), "4m 50s");
        assert_eq!(format_duration(3725), "1h 2m 5s");
    }
}
