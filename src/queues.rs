//! Abstract broker contract (spec §2 C5, §6 "Queue topology").
//!
//! Broker-agnostic by design: named logical queues, `variantID` selectors,
//! a `_DUP_ID` duplicate-detection property, a `_SCHED_DELIVERY` delayed-
//! delivery property, and transactional receive (a committed enqueue of a
//! `BatchJob` must carry its `BatchLoaded` marker in the same transaction,
//! per §4.5 step 3). [`memory::InMemoryQueues`] is the one concrete
//! implementation this crate ships; a production deployment swaps in a
//! real broker adapter behind the same trait, same as concrete
//! `PushNotificationSender` impls are out of scope (§1).

pub mod memory;

use crate::error::DispatchResult;
use crate::model::Platform;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// A broker-side predicate over message properties. Spec §6 says
/// selectors are "always `variantID = <id>`"; the type is left open for
/// future predicates rather than hard-coding that one case everywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    VariantId(String),
}

impl Selector {
    fn matches(&self, properties: &HashMap<String, PropertyValue>) -> bool {
        match self {
            Selector::VariantId(id) => {
                matches!(properties.get(VARIANT_ID_PROPERTY), Some(PropertyValue::Str(v)) if v == id)
            }
        }
    }
}

/// Message property value (spec §6: "string, long").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Str(String),
    Long(i64),
}

pub const VARIANT_ID_PROPERTY: &str = "variantID";
pub const DUP_ID_PROPERTY: &str = "_DUP_ID";
pub const SCHED_DELIVERY_PROPERTY: &str = "_SCHED_DELIVERY";

/// Current time as epoch milliseconds, the unit `_SCHED_DELIVERY` uses.
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

/// One message on a queue: an opaque JSON body plus broker properties.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub body: Vec<u8>,
    pub properties: HashMap<String, PropertyValue>,
}

impl QueueMessage {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            properties: HashMap::new(),
        }
    }

    /// Serialize `payload` as the message body.
    pub fn json(payload: &impl Serialize) -> DispatchResult<Self> {
        let body = serde_json::to_vec(payload)?;
        Ok(Self::new(body))
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> DispatchResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_variant_id(self, variant_id: impl Into<String>) -> Self {
        self.with_property(VARIANT_ID_PROPERTY, PropertyValue::Str(variant_id.into()))
    }

    /// Attach a duplicate-detection id: a second enqueue carrying the same
    /// id (on the same queue) is silently dropped by the broker.
    pub fn with_dedup_id(self, dedup_id: impl Into<String>) -> Self {
        self.with_property(DUP_ID_PROPERTY, PropertyValue::Str(dedup_id.into()))
    }

    /// Withhold delivery until `not_before_ms` (epoch milliseconds).
    pub fn with_scheduled_delivery(self, not_before_ms: i64) -> Self {
        self.with_property(SCHED_DELIVERY_PROPERTY, PropertyValue::Long(not_before_ms))
    }

    pub fn variant_id(&self) -> Option<&str> {
        match self.properties.get(VARIANT_ID_PROPERTY) {
            Some(PropertyValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn dedup_id(&self) -> Option<&str> {
        match self.properties.get(DUP_ID_PROPERTY) {
            Some(PropertyValue::Str(s)) => Some(s),
            _ => None,
        }
    }
}

/// A message received under a transaction, not yet acknowledged. Staged
/// enqueues made through [`Delivery::stage`] only become visible to other
/// consumers when [`Delivery::commit`] succeeds; [`Delivery::rollback`]
/// discards them and makes the original message redeliverable.
#[async_trait]
pub trait Delivery: Send {
    fn message(&self) -> &QueueMessage;

    /// How many times this message has previously been redelivered (0 on
    /// first delivery). Used by the trigger loop (§4.8) to detect
    /// exhaustion.
    fn redelivery_count(&self) -> u32;

    /// Stage an enqueue onto `queue` to be published atomically with this
    /// delivery's acknowledgement.
    fn stage(&mut self, queue: &str, message: QueueMessage);

    async fn commit(self: Box<Self>) -> DispatchResult<()>;

    async fn rollback(self: Box<Self>) -> DispatchResult<()>;
}

/// Broker-agnostic queue operations (spec §2 C5).
#[async_trait]
pub trait Queues: Send + Sync {
    /// Enqueue `message` outside of any transaction (used by callers that
    /// are not themselves processing a delivery, e.g. the job splitter).
    async fn enqueue(&self, queue: &str, message: QueueMessage) -> DispatchResult<()>;

    /// Wait for and transactionally receive the next message on `queue`.
    async fn receive(&self, queue: &str) -> DispatchResult<Box<dyn Delivery>>;

    /// Non-blocking receive, optionally filtered by `selector`. Consumed
    /// messages are removed immediately (JMS `receiveNoWait` semantics;
    /// spec §4.7 relies on this for the `BatchLoadedQueue`/
    /// `AllBatchesLoadedQueue` drains).
    async fn receive_no_wait(
        &self,
        queue: &str,
        selector: Option<&Selector>,
    ) -> DispatchResult<Option<QueueMessage>>;

    /// Repeatedly `receive_no_wait` until nothing more matches. Built on
    /// the single-message primitive, not a separate broker operation.
    async fn drain_no_wait(
        &self,
        queue: &str,
        selector: Option<&Selector>,
    ) -> DispatchResult<Vec<QueueMessage>> {
        let mut drained = Vec::new();
        while let Some(msg) = self.receive_no_wait(queue, selector).await? {
            drained.push(msg);
        }
        Ok(drained)
    }
}

/// Logical queue names (spec §6). Per-platform queues are parameterized
/// functions rather than an enum so new platforms need no code change
/// here, only a `SenderConfiguration` entry.
pub fn variant_job_queue(platform: Platform) -> String {
    format!("VariantJobQueue.{platform}")
}

pub fn batch_queue(platform: Platform) -> String {
    format!("BatchQueue.{platform}")
}

pub const BATCH_LOADED_QUEUE: &str = "BatchLoadedQueue";
pub const ALL_BATCHES_LOADED_QUEUE: &str = "AllBatchesLoadedQueue";
pub const METRICS_QUEUE: &str = "MetricsQueue";
pub const TRIGGER_QUEUE: &str = "TriggerQueue";
pub const DEAD_LETTER_QUEUE: &str = "DeadLetterQueue";
