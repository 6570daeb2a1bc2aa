use std::sync::Arc;

use groupcast_core::{config::Config, store::DocumentStore};

#[tokio::main]
async fn main() -> Result<(), groupcast_core::Error> {
    groupcast_core::logging::init("groupcast")?;

    let cfg = Arc::new(Config::load()?);
    let store = Arc::new(DocumentStore::open(cfg.store_path.clone())?);
    tracing::info!(path = %cfg.store_path.display(), "store opened");

    groupcast_telegram::router::run_polling(cfg, store)
        .await
        .map_err(|e| groupcast_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
