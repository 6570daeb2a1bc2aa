use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{sync::Mutex, time::Instant};

use crate::{
    broadcast::{
        port::DeliveryError,
        queue::{DispatchQueue, QueueEvent, Subscription},
        types::{CampaignReport, DeliveryOutcome, DeliveryTask, TaskId},
    },
    domain::ChatId,
    store::{BroadcastState, BroadcastStore},
    Result,
};

/// Orchestrates one broadcast per call: cool-down, enumeration, dispatch,
/// counted aggregation and the final report.
pub struct BroadcastManager {
    store: Arc<dyn BroadcastStore>,
    queue: DispatchQueue,
    cooldown: Duration,
    /// Serializes the cool-down check with the start marker write.
    start_lock: Mutex<()>,
}

/// How a campaign left the start phase.
enum Start {
    /// Tasks are queued; outcomes still have to be collected.
    Dispatching(Dispatch),
    /// Blocked or empty: the report is final.
    Finished(CampaignReport),
}

/// A campaign whose tasks are in the queue.
struct Dispatch {
    subscription: Subscription,
    in_flight: HashMap<TaskId, ChatId>,
    report: CampaignReport,
    started: Instant,
}

impl BroadcastManager {
    pub fn new(store: Arc<dyn BroadcastStore>, queue: DispatchQueue, cooldown: Duration) -> Self {
        Self {
            store,
            queue,
            cooldown,
            start_lock: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    pub async fn run_broadcast(&self, message: &str) -> Result<CampaignReport> {
        self.run_broadcast_at(message, Utc::now()).await
    }

    /// Run a campaign as if it started at `now`.
    ///
    /// Returns `Err` only when the store cannot be read or the start marker
    /// cannot be written; in both cases nothing has been dispatched.
    pub async fn run_broadcast_at(
        &self,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<CampaignReport> {
        let dispatch = match self.start(message, now).await? {
            Start::Dispatching(dispatch) => dispatch,
            Start::Finished(report) => return Ok(report),
        };

        let Dispatch {
            subscription,
            in_flight,
            report,
            started,
        } = dispatch;
        let report = collect(subscription, in_flight, report).await;

        let finished_at = now + chrono::Duration::from_std(started.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let state = BroadcastState {
            last_broadcast_at: Some(finished_at),
            last_started_at: Some(now),
        };
        if let Err(e) = self.store.save_broadcast_state(&state).await {
            // The start marker already holds the cool-down; the report must still go out.
            tracing::error!("failed to record broadcast completion: {e}");
        }

        tracing::info!(
            total = report.total_destinations,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "broadcast campaign finished"
        );
        Ok(report)
    }

    /// Remaining cool-down at `now`, if a campaign would be blocked.
    pub fn cooldown_remaining(
        &self,
        state: &BroadcastState,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let last = state.last_activity()?;
        // A timestamp in the future (clock skew) counts as "just now".
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        if elapsed < self.cooldown {
            Some(self.cooldown - elapsed)
        } else {
            None
        }
    }

    /// Cool-down check, enumeration and submission.
    async fn start(&self, message: &str, now: DateTime<Utc>) -> Result<Start> {
        let _guard = self.start_lock.lock().await;

        let mut state = self.store.broadcast_state().await.map_err(|e| {
            tracing::error!("broadcast aborted, cannot read broadcast state: {e}");
            e
        })?;
        if let Some(retry_after) = self.cooldown_remaining(&state, now) {
            tracing::info!(
                retry_after_secs = retry_after.as_secs(),
                "broadcast blocked by cool-down window"
            );
            return Ok(Start::Finished(CampaignReport::blocked(retry_after)));
        }

        let destinations = self.store.eligible_destinations().await.map_err(|e| {
            tracing::error!("broadcast aborted, cannot enumerate destinations: {e}");
            e
        })?;
        if destinations.is_empty() {
            tracing::info!("broadcast skipped, no groups where the bot is an admin");
            return Ok(Start::Finished(CampaignReport::no_destinations()));
        }

        state.last_started_at = Some(now);
        self.store.save_broadcast_state(&state).await?;

        tracing::info!(
            destinations = destinations.len(),
            "broadcast campaign dispatching"
        );

        // Subscribe before submitting so no outcome can be missed.
        let subscription = self.queue.subscribe();
        let mut report = CampaignReport::collecting(destinations.len());
        let mut in_flight = HashMap::with_capacity(destinations.len());
        for destination in destinations {
            match self.queue.submit(DeliveryTask::new(destination, message)) {
                Ok(id) => {
                    in_flight.insert(id, destination);
                }
                Err(e) => {
                    tracing::error!(%destination, "could not enqueue delivery: {e}");
                    report.record(&DeliveryOutcome::failed(
                        destination,
                        DeliveryError::new(None, e.to_string()),
                        0,
                    ));
                }
            }
        }

        Ok(Start::Dispatching(Dispatch {
            subscription,
            in_flight,
            report,
            started: Instant::now(),
        }))
    }
}

/// Count this campaign's outcomes until every destination is settled.
///
/// Completion is decided by the count alone; the queue's `Drained` event may
/// belong to another campaign's tasks and is ignored.
async fn collect(
    mut subscription: Subscription,
    mut in_flight: HashMap<TaskId, ChatId>,
    mut report: CampaignReport,
) -> CampaignReport {
    while !report.is_complete() {
        match subscription.recv().await {
            Some(QueueEvent::Finished { task_id, outcome }) => {
                if in_flight.remove(&task_id).is_some() {
                    report.record(&outcome);
                }
            }
            Some(QueueEvent::Drained) => {}
            None => {
                tracing::error!(
                    remaining = in_flight.len(),
                    "dispatch worker stopped before the campaign finished"
                );
                let mut remaining: Vec<ChatId> = in_flight.drain().map(|(_, d)| d).collect();
                remaining.sort();
                for destination in remaining {
                    report.record(&DeliveryOutcome::failed(
                        destination,
                        DeliveryError::new(None, "dispatch stopped before delivery"),
                        0,
                    ));
                }
            }
        }
    }
    // Dropping the subscription releases this campaign's listener.
    drop(subscription);
    report
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio::sync::Notify;

    use super::*;
    use crate::{
        broadcast::{port::DeliveryClient, rate::RateController, retry::RetryPolicy},
        store::{DocumentStore, GroupRecord, StoreDocument},
    };

    /// Holds the delivery to one destination until released.
    struct GatedClient {
        gated: ChatId,
        reached: Notify,
        release: Notify,
    }

    #[async_trait]
    impl DeliveryClient for GatedClient {
        async fn send(
            &self,
            destination: ChatId,
            _text: &str,
        ) -> std::result::Result<(), DeliveryError> {
            if destination == self.gated {
                self.reached.notify_one();
                self.release.notified().await;
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drained_event_does_not_end_collection() {
        let client = Arc::new(GatedClient {
            gated: ChatId(-1),
            reached: Notify::new(),
            release: Notify::new(),
        });
        let rate = Arc::new(RateController::new(
            Duration::from_millis(100),
            Duration::from_secs(1),
        ));
        let queue = DispatchQueue::spawn(
            client.clone(),
            rate,
            RetryPolicy::new(1, Duration::from_secs(1)),
        );

        let mut doc = StoreDocument::default();
        for id in [-2, -1] {
            doc.groups.insert(
                id,
                GroupRecord {
                    name: format!("group {id}"),
                    is_admin: true,
                },
            );
        }
        let mgr = Arc::new(BroadcastManager::new(
            Arc::new(DocumentStore::from_document(doc)),
            queue.clone(),
            Duration::from_secs(300),
        ));
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();

        let run = tokio::spawn({
            let mgr = mgr.clone();
            async move { mgr.run_broadcast_at("hi", now).await }
        });

        // -2 is delivered; -1 is held inside the client.
        client.reached.notified().await;
        queue.publish(QueueEvent::Drained);
        queue.publish(QueueEvent::Finished {
            task_id: TaskId(u64::MAX),
            outcome: DeliveryOutcome::delivered(ChatId(-999), 1),
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!run.is_finished());

        client.release.notify_one();
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.total_destinations, 2);
        assert_eq!(report.succeeded, 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.settled(), report.total_destinations);
        assert_eq!(queue.listener_count(), 0);
    }
}
