//! In-process broker (the only concrete [`super::Queues`] implementation
//! this crate ships). Built on `tokio::sync::Mutex` + `tokio::sync::Notify`
//! per queue, the same primitives the teacher reaches for around its
//! in-memory caches, rather than a channel per consumer, so that
//! `receive_no_wait`/`drain_no_wait` can peek without committing to taking
//! a message.

use super::{now_ms, Delivery, PropertyValue, QueueMessage, Queues, Selector, SCHED_DELIVERY_PROPERTY};
use crate::error::DispatchResult;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

const REDELIVERY_COUNT_PROPERTY: &str = "_REDELIVERY_COUNT";

fn not_before(message: &QueueMessage) -> Option<i64> {
    match message.properties.get(SCHED_DELIVERY_PROPERTY) {
        Some(PropertyValue::Long(ms)) => Some(*ms),
        _ => None,
    }
}

fn redelivery_count(message: &QueueMessage) -> u32 {
    match message.properties.get(REDELIVERY_COUNT_PROPERTY) {
        Some(PropertyValue::Long(count)) => (*count).max(0) as u32,
        _ => 0,
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<QueueMessage>,
    /// Messages withheld until their `_SCHED_DELIVERY` time.
    delayed: Vec<QueueMessage>,
    dedup_seen: HashSet<String>,
}

impl QueueState {
    /// Move any delayed message whose time has come into `ready`.
    fn mature(&mut self) {
        let now = now_ms();
        let mut still_delayed = Vec::with_capacity(self.delayed.len());
        for message in self.delayed.drain(..) {
            match not_before(&message) {
                Some(t) if t > now => still_delayed.push(message),
                _ => self.ready.push_back(message),
            }
        }
        self.delayed = still_delayed;
    }
}

struct Queue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl Queue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }
}

type QueueTable = Arc<Mutex<HashMap<String, Arc<Queue>>>>;

async fn lookup(queues: &QueueTable, name: &str) -> Arc<Queue> {
    let mut queues = queues.lock().await;
    queues
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(Queue::new()))
        .clone()
}

async fn push(queues: &QueueTable, queue_name: &str, message: QueueMessage) -> DispatchResult<()> {
    let queue = lookup(queues, queue_name).await;
    {
        let mut state = queue.state.lock().await;
        if let Some(dedup_id) = message.dedup_id() {
            if !state.dedup_seen.insert(dedup_id.to_string()) {
                return Ok(());
            }
        }
        if not_before(&message).is_some() {
            state.delayed.push(message);
        } else {
            state.ready.push_back(message);
        }
    }
    queue.notify.notify_waiters();
    Ok(())
}

async fn requeue_front(
    queues: &QueueTable,
    queue_name: &str,
    message: QueueMessage,
) -> DispatchResult<()> {
    let queue = lookup(queues, queue_name).await;
    {
        let mut state = queue.state.lock().await;
        state.ready.push_front(message);
    }
    queue.notify.notify_waiters();
    Ok(())
}

/// In-memory, single-process implementation of [`Queues`]. Durable only
/// for the lifetime of the [`InMemoryQueues`] value; intended for tests
/// and for running the pipeline in a single binary without an external
/// broker.
pub struct InMemoryQueues {
    queues: QueueTable,
}

impl InMemoryQueues {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Queues for InMemoryQueues {
    async fn enqueue(&self, queue: &str, message: QueueMessage) -> DispatchResult<()> {
        push(&self.queues, queue, message).await
    }

    async fn receive(&self, queue_name: &str) -> DispatchResult<Box<dyn Delivery>> {
        let queue = lookup(&self.queues, queue_name).await;
        loop {
            {
                let mut state = queue.state.lock().await;
                state.mature();
                if let Some(message) = state.ready.pop_front() {
                    let redelivery_count = redelivery_count(&message);
                    return Ok(Box::new(MemoryDelivery {
                        queues: self.queues.clone(),
                        message,
                        redelivery_count,
                        staged: Vec::new(),
                        origin_queue: queue_name.to_string(),
                    }));
                }
            }
            queue.notify.notified().await;
        }
    }

    async fn receive_no_wait(
        &self,
        queue_name: &str,
        selector: Option<&Selector>,
    ) -> DispatchResult<Option<QueueMessage>> {
        let queue = lookup(&self.queues, queue_name).await;
        let mut state = queue.state.lock().await;
        state.mature();
        let position = state.ready.iter().position(|m| match selector {
            Some(sel) => sel.matches(&m.properties),
            None => true,
        });
        Ok(position.and_then(|i| state.ready.remove(i)))
    }
}

struct MemoryDelivery {
    queues: QueueTable,
    message: QueueMessage,
    redelivery_count: u32,
    staged: Vec<(String, QueueMessage)>,
    origin_queue: String,
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn message(&self) -> &QueueMessage {
        &self.message
    }

    fn redelivery_count(&self) -> u32 {
        self.redelivery_count
    }

    fn stage(&mut self, queue: &str, message: QueueMessage) {
        self.staged.push((queue.to_string(), message));
    }

    async fn commit(self: Box<Self>) -> DispatchResult<()> {
        for (queue, message) in self.staged {
            push(&self.queues, &queue, message).await?;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DispatchResult<()> {
        let mut redelivered = self.message;
        redelivered.properties.insert(
            REDELIVERY_COUNT_PROPERTY.to_string(),
            PropertyValue::Long((self.redelivery_count + 1) as i64),
        );
        requeue_front(&self.queues, &self.origin_queue, redelivered).await
    }
}
