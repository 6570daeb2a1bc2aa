use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use groupcast_core::{
    broadcast::{build_manager, BroadcastManager, DeliveryClient},
    config::Config,
    store::{BotStore, BroadcastStore, DocumentStore},
};

use crate::handlers;
use crate::TelegramDeliveryClient;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Arc<dyn BotStore>,
    pub broadcaster: Arc<BroadcastManager>,
}

pub async fn run_polling(cfg: Arc<Config>, store: Arc<DocumentStore>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "groupcast started"),
        Err(e) => tracing::warn!("get_me failed: {e}"),
    }
    tracing::info!(
        allowed_users = cfg.telegram_allowed_users.len(),
        store = %cfg.store_path.display(),
        "configuration loaded"
    );

    let client: Arc<dyn DeliveryClient> = Arc::new(TelegramDeliveryClient::new(bot.clone()));
    // The manager only sees the broadcast half of the store.
    let broadcast_store: Arc<dyn BroadcastStore> = store.clone();
    let broadcaster = Arc::new(build_manager(&cfg.broadcast, client, broadcast_store));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        store: store as Arc<dyn BotStore>,
        broadcaster: broadcaster.clone(),
    });

    let handler = dptree::entry()
        .branch(Update::filter_my_chat_member().endpoint(handlers::handle_my_chat_member))
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("dispatcher stopped, draining broadcast queue");
    broadcaster.queue().shutdown().await;
    Ok(())
}
