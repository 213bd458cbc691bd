//! Variant-job worker: the loader side of C2/C4 (spec §4.5).

use crate::error::DispatchResult;
use crate::model::{BatchJob, Platform, UnifiedPushMessage, VariantJob};
use crate::queues::{
    batch_queue, now_ms, variant_job_queue, QueueMessage, Queues, ALL_BATCHES_LOADED_QUEUE,
    BATCH_LOADED_QUEUE, TRIGGER_QUEUE,
};
use crate::sender_config::SenderConfigRegistry;
use crate::store::TokenLoader;
use std::sync::Arc;
use std::time::Duration;

pub struct LoaderWorker<L, Q> {
    token_loader: Arc<L>,
    queues: Arc<Q>,
    sender_config: Arc<SenderConfigRegistry>,
    platform: Platform,
    trigger_redelivery_delay: Duration,
}

impl<L, Q> LoaderWorker<L, Q>
where
    L: TokenLoader,
    Q: Queues,
{
    pub fn new(
        token_loader: Arc<L>,
        queues: Arc<Q>,
        sender_config: Arc<SenderConfigRegistry>,
        platform: Platform,
        trigger_redelivery_delay: Duration,
    ) -> Self {
        Self {
            token_loader,
            queues,
            sender_config,
            platform,
            trigger_redelivery_delay,
        }
    }

    /// Process one `VariantJob` delivery per spec §4.5. The caller commits
    /// or rolls back the supplied `delivery` based on the returned result;
    /// this function only stages enqueues onto it.
    pub async fn process(
        &self,
        job: &VariantJob,
        delivery: &mut dyn crate::queues::Delivery,
    ) -> DispatchResult<()> {
        let message: UnifiedPushMessage = serde_json::from_str(&job.serialized_message)?;
        let config = self.sender_config.for_platform(self.platform);

        let (tokens, next_cursor, is_last) = self
            .token_loader
            .load_next(
                &job.variant_id,
                &message.filter,
                job.last_token_page_cursor.as_deref(),
                config.tokens_to_load(),
            )
            .await?;

        let batches: Vec<&[String]> = tokens.chunks(config.batch_size() as usize).collect();
        let last_batch_index = batches.len().checked_sub(1);

        for (i, batch) in batches.iter().enumerate() {
            let is_last_batch = is_last && Some(i) == last_batch_index;
            let batch_job = BatchJob {
                push_message_information_id: job.push_message_information_id.clone(),
                variant_id: job.variant_id.clone(),
                serialized_message: job.serialized_message.clone(),
                tokens: batch.to_vec(),
                is_last_batch,
            };
            delivery.stage(
                &batch_queue(self.platform),
                QueueMessage::json(&batch_job)?.with_variant_id(job.variant_id.clone()),
            );
            delivery.stage(
                BATCH_LOADED_QUEUE,
                QueueMessage::new(Vec::new()).with_variant_id(job.variant_id.clone()),
            );
        }

        if !is_last {
            let next_job = VariantJob {
                push_message_information_id: job.push_message_information_id.clone(),
                variant_id: job.variant_id.clone(),
                serialized_message: job.serialized_message.clone(),
                last_token_page_cursor: next_cursor,
            };
            delivery.stage(
                &variant_job_queue(self.platform),
                QueueMessage::json(&next_job)?.with_variant_id(job.variant_id.clone()),
            );
        } else {
            delivery.stage(
                ALL_BATCHES_LOADED_QUEUE,
                QueueMessage::new(Vec::new()).with_variant_id(job.variant_id.clone()),
            );
        }

        let trigger_delay_ms = now_ms() + self.trigger_redelivery_delay.as_millis() as i64;
        delivery.stage(
            TRIGGER_QUEUE,
            QueueMessage::new(job.push_message_information_id.clone().into_bytes())
                .with_scheduled_delivery(trigger_delay_ms),
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageFilter;
    use crate::queues::memory::InMemoryQueues;
    use async_trait::async_trait;

    struct FixedTokenLoader {
        tokens: Vec<String>,
    }

    #[async_trait]
    impl TokenLoader for FixedTokenLoader {
        async fn load_next(
            &self,
            _variant_id: &str,
            _filter: &MessageFilter,
            _cursor: Option<&str>,
            limit: u32,
        ) -> DispatchResult<(Vec<String>, Option<String>, bool)> {
            let page: Vec<String> = self.tokens.iter().take(limit as usize).cloned().collect();
            Ok((page, None, true))
        }
    }

    fn message() -> UnifiedPushMessage {
        UnifiedPushMessage {
            alert: Some("hi".to_string()),
            title: None,
            badge: None,
            sound: None,
            content_available: false,
            user_data: Default::default(),
            filter: Default::default(),
            time_to_live: None,
        }
    }

    #[tokio::test]
    async fn last_page_stages_batches_and_terminal_markers() {
        let loader = Arc::new(FixedTokenLoader {
            tokens: vec!["t1".into(), "t2".into(), "t3".into()],
        });
        let queues = Arc::new(InMemoryQueues::new());
        let sender_config = Arc::new(SenderConfigRegistry::new(Default::default()));
        let worker = LoaderWorker::new(
            loader,
            queues.clone(),
            sender_config,
            Platform::Android,
            Duration::from_millis(1000),
        );

        let job = VariantJob {
            push_message_information_id: "job-1".to_string(),
            variant_id: "v1".to_string(),
            serialized_message: serde_json::to_string(&message()).unwrap(),
            last_token_page_cursor: None,
        };

        queues
            .enqueue(
                &variant_job_queue(Platform::Android),
                QueueMessage::json(&job).unwrap(),
            )
            .await
            .unwrap();
        let mut delivery = queues
            .receive(&variant_job_queue(Platform::Android))
            .await
            .unwrap();

        worker.process(&job, delivery.as_mut()).await.unwrap();
        delivery.commit().await.unwrap();

        let batches = queues
            .drain_no_wait(&batch_queue(Platform::Android), None)
            .await
            .unwrap();
        assert_eq!(batches.len(), 1);

        let markers = queues.drain_no_wait(BATCH_LOADED_QUEUE, None).await.unwrap();
        assert_eq!(markers.len(), 1);

        let all_loaded = queues
            .drain_no_wait(ALL_BATCHES_LOADED_QUEUE, None)
            .await
            .unwrap();
        assert_eq!(all_loaded.len(), 1);

        let trigger = queues.receive_no_wait(TRIGGER_QUEUE, None).await.unwrap();
        assert!(trigger.is_none(), "trigger is scheduled, not yet due");
    }
}
