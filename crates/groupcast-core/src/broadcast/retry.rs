use std::time::Duration;

use tokio::time::sleep;

use crate::{
    broadcast::{
        port::DeliveryClient,
        types::{DeliveryOutcome, DeliveryTask},
    },
    config::BroadcastConfig,
};

/// Bounded retry for a single destination.
///
/// Only flood-control failures (429) are retried, after a fixed pause that is
/// independent of the adaptive pacing in [`super::rate::RateController`].
/// Every other failure is terminal on the first attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub fn from_config(cfg: &BroadcastConfig) -> Self {
        Self::new(cfg.max_attempts, cfg.retry_delay)
    }

    pub async fn deliver(
        &self,
        client: &dyn DeliveryClient,
        task: &DeliveryTask,
    ) -> DeliveryOutcome {
        let budget = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match client.send(task.destination, &task.payload).await {
                Ok(()) => return DeliveryOutcome::delivered(task.destination, attempt),
                Err(err) => err,
            };

            if !err.is_rate_limited() || attempt >= budget {
                return DeliveryOutcome::failed(task.destination, err, attempt);
            }

            tracing::info!(
                destination = %task.destination,
                attempt,
                budget,
                wait_ms = self.retry_delay.as_millis() as u64,
                "rate limited, retrying"
            );
            sleep(self.retry_delay).await;
        }
    }
}
