use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    broadcast::{
        port::DeliveryClient,
        rate::RateController,
        retry::RetryPolicy,
        types::{DeliveryOutcome, DeliveryTask, TaskId},
    },
    errors::Error,
    Result,
};

/// Notifications published by the dispatch worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueEvent {
    /// A task reached its terminal outcome.
    Finished {
        task_id: TaskId,
        outcome: DeliveryOutcome,
    },
    /// Nothing is queued or in flight anymore.
    Drained,
}

struct Job {
    id: TaskId,
    task: DeliveryTask,
}

/// State shared between queue handles and the worker.
struct Shared {
    rate: Arc<RateController>,
    listeners: Mutex<HashMap<u64, mpsc::UnboundedSender<QueueEvent>>>,
    next_listener: AtomicU64,
    next_task: AtomicU64,
    pending: AtomicUsize,
}

impl Shared {
    fn publish(&self, event: QueueEvent) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Drop every sender so subscribers observe the worker going away.
    fn close_listeners(&self) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// Process-wide sequential delivery queue.
///
/// A single worker delivers tasks one at a time in submission order: the Bot
/// API flood limit is global to the bot, so parallel sends would only trade
/// throughput for 429s. Between two tasks the worker waits for the
/// [`RateController`]'s current delay, measured from the end of the previous
/// task. Outcomes are published to every live [`Subscription`].
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<Job>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DispatchQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(
        client: Arc<dyn DeliveryClient>,
        rate: Arc<RateController>,
        retry: RetryPolicy,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            rate,
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(0),
            next_task: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();

        let worker = Worker {
            client,
            retry,
            shared: shared.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(worker.run(rx));

        Self {
            tx,
            shared,
            cancel,
            worker: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Enqueue a task. Returns as soon as the task is queued.
    pub fn submit(&self, task: DeliveryTask) -> Result<TaskId> {
        let id = TaskId(self.shared.next_task.fetch_add(1, Ordering::SeqCst));
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Job { id, task }).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::External("dispatch queue is closed".to_string()));
        }
        Ok(id)
    }

    /// Register a listener. It is released when the subscription is dropped.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.shared.next_listener.fetch_add(1, Ordering::SeqCst);
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);
        Subscription {
            id,
            rx,
            shared: self.shared.clone(),
        }
    }

    /// Tasks queued or in flight.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn rate(&self) -> &Arc<RateController> {
        &self.shared.rate
    }

    /// Stop the worker after the task in flight (if any) and wait for it.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Publish an event as if the worker had, to exercise subscribers.
    #[cfg(test)]
    pub(crate) fn publish(&self, event: QueueEvent) {
        self.shared.publish(event);
    }
}

/// Live registration for [`QueueEvent`]s.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<QueueEvent>,
    shared: Arc<Shared>,
}

impl Subscription {
    /// Next event, or `None` once the worker has stopped.
    pub async fn recv(&mut self) -> Option<QueueEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

struct Worker {
    client: Arc<dyn DeliveryClient>,
    retry: RetryPolicy,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Job>) {
        let mut last_finished: Option<Instant> = None;

        loop {
            let job = tokio::select! {
                _ = self.cancel.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            if let Some(prev) = last_finished {
                let resume_at = prev + self.shared.rate.current_delay();
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = sleep_until(resume_at) => {}
                }
            }

            let outcome = self.process(&job).await;
            last_finished = Some(Instant::now());

            self.shared.publish(QueueEvent::Finished {
                task_id: job.id,
                outcome,
            });

            if self.shared.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                self.shared.publish(QueueEvent::Drained);
            }
        }

        tracing::debug!("dispatch worker stopped");
        self.shared.close_listeners();
    }

    async fn process(&self, job: &Job) -> DeliveryOutcome {
        let outcome = self.retry.deliver(self.client.as_ref(), &job.task).await;
        self.shared.rate.observe(outcome.success);

        if outcome.success {
            tracing::info!(
                task = %job.id,
                destination = %outcome.destination,
                attempts = outcome.attempts,
                "message delivered"
            );
        } else {
            tracing::warn!(
                task = %job.id,
                destination = %outcome.destination,
                attempts = outcome.attempts,
                code = ?outcome.error_code,
                reason = %outcome.reason(),
                "message delivery failed"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::{broadcast::port::DeliveryError, domain::ChatId};

    #[derive(Default)]
    struct RecordingClient {
        calls: Mutex<Vec<(ChatId, Instant)>>,
        fail: Vec<ChatId>,
    }

    #[async_trait]
    impl DeliveryClient for RecordingClient {
        async fn send(
            &self,
            destination: ChatId,
            _text: &str,
        ) -> std::result::Result<(), DeliveryError> {
            self.calls.lock().unwrap().push((destination, Instant::now()));
            if self.fail.contains(&destination) {
                return Err(DeliveryError::new(Some(400), "Bad Request: chat not found"));
            }
            Ok(())
        }
    }

    fn queue_with(client: Arc<RecordingClient>) -> DispatchQueue {
        DispatchQueue::spawn(
            client,
            Arc::new(RateController::new(
                Duration::from_millis(1000),
                Duration::from_millis(30_000),
            )),
            RetryPolicy::new(3, Duration::from_millis(5000)),
        )
    }

    async fn collect(sub: &mut Subscription, finished: usize) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        let mut seen = 0;
        while seen < finished {
            let ev = sub.recv().await.expect("worker stopped early");
            if matches!(ev, QueueEvent::Finished { .. }) {
                seen += 1;
            }
            events.push(ev);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn processes_in_submission_order_and_drains_once() {
        let client = Arc::new(RecordingClient::default());
        let queue = queue_with(client.clone());
        let mut sub = queue.subscribe();

        for id in [-1, -2, -3] {
            queue.submit(DeliveryTask::new(ChatId(id), "hi")).unwrap();
        }

        let mut events = collect(&mut sub, 3).await;
        events.push(sub.recv().await.unwrap());

        let order: Vec<ChatId> = events
            .iter()
            .filter_map(|e| match e {
                QueueEvent::Finished { outcome, .. } => Some(outcome.destination),
                QueueEvent::Drained => None,
            })
            .collect();
        assert_eq!(order, vec![ChatId(-1), ChatId(-2), ChatId(-3)]);
        assert_eq!(events.last(), Some(&QueueEvent::Drained));
        assert_eq!(
            events.iter().filter(|e| **e == QueueEvent::Drained).count(),
            1
        );
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spaces_tasks_by_adaptive_delay() {
        let client = Arc::new(RecordingClient {
            fail: vec![ChatId(-1)],
            ..Default::default()
        });
        let queue = queue_with(client.clone());
        let mut sub = queue.subscribe();

        for id in [-1, -2, -3] {
            queue.submit(DeliveryTask::new(ChatId(id), "hi")).unwrap();
        }
        collect(&mut sub, 3).await;

        let calls = client.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        // Failure doubled the delay (1s -> 2s), success decayed it (2s -> 1.8s).
        assert_eq!(calls[1].1 - calls[0].1, Duration::from_millis(2000));
        assert_eq!(calls[2].1 - calls[1].1, Duration::from_millis(1800));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delivery_does_not_stop_worker() {
        let client = Arc::new(RecordingClient {
            fail: vec![ChatId(-2)],
            ..Default::default()
        });
        let queue = queue_with(client.clone());
        let mut sub = queue.subscribe();

        queue.submit(DeliveryTask::new(ChatId(-2), "hi")).unwrap();
        queue.submit(DeliveryTask::new(ChatId(-3), "hi")).unwrap();

        let events = collect(&mut sub, 2).await;
        let outcomes: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                QueueEvent::Finished { outcome, .. } => Some(outcome.success),
                QueueEvent::Drained => None,
            })
            .collect();
        assert_eq!(outcomes, vec![false, true]);
        assert_eq!(queue.rate().snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_subscription_is_released() {
        let queue = queue_with(Arc::new(RecordingClient::default()));
        let a = queue.subscribe();
        let b = queue.subscribe();
        assert_eq!(queue.listener_count(), 2);
        drop(a);
        assert_eq!(queue.listener_count(), 1);
        drop(b);
        assert_eq!(queue.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_subscriptions_and_rejects_new_tasks() {
        let queue = queue_with(Arc::new(RecordingClient::default()));
        let mut sub = queue.subscribe();

        queue.shutdown().await;

        assert!(sub.recv().await.is_none());
        assert!(queue.submit(DeliveryTask::new(ChatId(-1), "late")).is_err());
        assert_eq!(queue.pending(), 0);
    }
}
