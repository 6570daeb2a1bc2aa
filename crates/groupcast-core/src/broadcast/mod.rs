//! Broadcast dispatcher: adaptive pacing, bounded retry, a sequential
//! delivery queue and the campaign manager that drives them.

pub mod campaign;
pub mod port;
pub mod queue;
pub mod rate;
pub mod retry;
pub mod types;

use std::sync::Arc;

pub use campaign::BroadcastManager;
pub use port::{DeliveryClient, DeliveryError, RATE_LIMITED_CODE};
pub use queue::{DispatchQueue, QueueEvent, Subscription};
pub use rate::{RateController, RateState};
pub use retry::RetryPolicy;
pub use types::{
    CampaignReport, CampaignStatus, DeliveryOutcome, DeliveryTask, FailedDestination, TaskId,
};

use crate::{config::BroadcastConfig, store::BroadcastStore};

/// Wire the dispatcher from configuration. Must run inside a tokio runtime.
pub fn build_manager(
    cfg: &BroadcastConfig,
    client: Arc<dyn DeliveryClient>,
    store: Arc<dyn BroadcastStore>,
) -> BroadcastManager {
    let rate = Arc::new(RateController::from_config(cfg));
    let queue = DispatchQueue::spawn(client, rate, RetryPolicy::from_config(cfg));
    BroadcastManager::new(store, queue, cfg.cooldown)
}
