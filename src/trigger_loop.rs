//! `TriggerLoop` (spec §4.8, C9): keeps the collector alive across
//! redeliveries until a push job converges, routing exhausted triggers to
//! the dead-letter sink.
//!
//! The broker has no native REQUIRES_NEW transaction primitive here, so
//! "REQUIRES_NEW" is modeled the same way the rest of this crate models
//! transactionality: commit on convergence, roll back (letting the
//! in-memory broker redeliver) otherwise. Redelivery count is read off the
//! delivery itself rather than a separate counter, per [`crate::queues`]'s
//! `Delivery::redelivery_count`.

use crate::dead_letter::{DeadLetterRecord, DeadLetterSink};
use crate::error::{DispatchError, DispatchResult};
use crate::metrics_collector::MetricsCollector;
use crate::queues::Delivery;
use crate::store::MetricsStore;
use crate::events::PipelineEvents;
use crate::queues::Queues;

pub struct TriggerLoop<S, Q, E, D> {
    collector: std::sync::Arc<MetricsCollector<S, Q, E>>,
    dead_letters: std::sync::Arc<D>,
    max_redeliveries: u32,
}

impl<S, Q, E, D> TriggerLoop<S, Q, E, D>
where
    S: MetricsStore,
    Q: Queues,
    E: PipelineEvents,
    D: DeadLetterSink,
{
    pub fn new(
        collector: std::sync::Arc<MetricsCollector<S, Q, E>>,
        dead_letters: std::sync::Arc<D>,
        max_redeliveries: u32,
    ) -> Self {
        Self {
            collector,
            dead_letters,
            max_redeliveries,
        }
    }

    /// Process one `TriggerMetricCollection` delivery. Returns `Ok(true)`
    /// if the caller should commit (convergence reached or the trigger was
    /// routed to the dead-letter sink), `Ok(false)` if the caller should
    /// roll back so the broker redelivers.
    pub async fn process(&self, delivery: &dyn Delivery) -> DispatchResult<bool> {
        let push_id = String::from_utf8(delivery.message().body.clone())
            .map_err(|e| DispatchError::Serialization(e.to_string()))?;

        if delivery.redelivery_count() >= self.max_redeliveries {
            self.dead_letters
                .record(DeadLetterRecord {
                    push_message_information_id: push_id.clone(),
                    reason: format!(
                        "trigger exhausted after {} redeliveries",
                        delivery.redelivery_count()
                    ),
                    recorded_at: chrono::Utc::now(),
                })
                .await;
            return Ok(true);
        }

        let completed = self.collector.recheck(&push_id).await?;
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dead_letter::LoggingDeadLetterSink;
    use crate::metrics_cache::MetricsCache;
    use crate::model::{DeliveryStatus, PushMessageInformation, SubmitterMeta, VariantMetricInformation};
    use crate::queues::memory::InMemoryQueues;
    use crate::queues::{QueueMessage, Queues, ALL_BATCHES_LOADED_QUEUE, TRIGGER_QUEUE};
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    async fn trigger_delivery(
        queues: &Arc<InMemoryQueues>,
        push_id: &str,
        redeliveries: u32,
    ) -> Box<dyn Delivery> {
        queues
            .enqueue(TRIGGER_QUEUE, QueueMessage::new(push_id.as_bytes().to_vec()))
            .await
            .unwrap();
        for _ in 0..redeliveries {
            let delivery = queues.receive(TRIGGER_QUEUE).await.unwrap();
            delivery.rollback().await.unwrap();
        }
        queues.receive(TRIGGER_QUEUE).await.unwrap()
    }

    #[tokio::test]
    async fn exhausted_trigger_is_routed_to_dead_letter_sink() {
        let store = Arc::new(InMemoryStore::new());
        let queues = Arc::new(InMemoryQueues::new());
        let cache = Arc::new(MetricsCache::new());
        let events = Arc::new(crate::events::NullEventSink);
        let collector = Arc::new(MetricsCollector::new(store, queues.clone(), cache, events));
        let dead_letters = Arc::new(LoggingDeadLetterSink::new());
        let trigger_loop = TriggerLoop::new(collector, dead_letters.clone(), 3);

        let delivery = trigger_delivery(&queues, "job-1", 3).await;
        let should_commit = trigger_loop.process(delivery.as_ref()).await.unwrap();
        delivery.commit().await.unwrap();

        assert!(should_commit);
        let records = dead_letters.snapshot().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].push_message_information_id, "job-1");
    }

    #[tokio::test]
    async fn under_threshold_delegates_to_collector_recheck() {
        let store = Arc::new(InMemoryStore::new());
        let queues = Arc::new(InMemoryQueues::new());
        let cache = Arc::new(MetricsCache::new());
        let events = Arc::new(crate::events::NullEventSink);

        store
            .insert(PushMessageInformation::new(
                "job-2",
                "app-1",
                "{}".to_string(),
                1,
                chrono::Utc::now(),
                SubmitterMeta::default(),
            ))
            .await
            .unwrap();
        store
            .update_with("job-2", |info| {
                info.variant_informations.insert(
                    "v1".to_string(),
                    VariantMetricInformation {
                        variant_id: "v1".to_string(),
                        receivers: 3,
                        served_batches: 1,
                        total_batches: 1,
                        delivery_status: DeliveryStatus::Succeeded,
                        reason: None,
                    },
                );
            })
            .await
            .unwrap();
        queues
            .enqueue(
                ALL_BATCHES_LOADED_QUEUE,
                QueueMessage::new(Vec::new()).with_variant_id("v1"),
            )
            .await
            .unwrap();

        let collector = Arc::new(MetricsCollector::new(store, queues.clone(), cache, events));
        let dead_letters = Arc::new(LoggingDeadLetterSink::new());
        let trigger_loop = TriggerLoop::new(collector, dead_letters.clone(), 10);

        let delivery = trigger_delivery(&queues, "job-2", 1).await;
        let should_commit = trigger_loop.process(delivery.as_ref()).await.unwrap();
        delivery.commit().await.unwrap();

        assert!(should_commit, "recheck should converge with the terminal marker present");
        assert!(dead_letters.snapshot().await.is_empty());
    }
}
