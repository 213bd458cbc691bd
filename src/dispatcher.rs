//! `Dispatcher` (spec §4.6, C4): drives a platform sender for one
//! `BatchJob` and folds the outcome into a `VariantMetricInformation`.

use crate::error::DispatchResult;
use crate::model::{BatchJob, DeliveryStatus, Variant, VariantMetricInformation};
use crate::queues::{Delivery, QueueMessage, METRICS_QUEUE};
use crate::sender::{OneShotCallback, PushNotificationSender, SendOutcome};
use crate::store::MetricsStore;
use std::sync::Arc;

pub struct Dispatcher<S> {
    store: Arc<S>,
    sender: Arc<dyn PushNotificationSender>,
}

impl<S> Dispatcher<S>
where
    S: MetricsStore,
{
    pub fn new(store: Arc<S>, sender: Arc<dyn PushNotificationSender>) -> Self {
        Self { store, sender }
    }

    /// Process one `BatchJob` delivery per spec §4.6: invoke the sender,
    /// block on its callback, record a rejection if any (DESIGN.md Open
    /// Question 2), then stage the resulting metric update onto
    /// `MetricsQueue`. The caller commits/rolls back `delivery`.
    pub async fn process(
        &self,
        batch: &BatchJob,
        variant: &Variant,
        delivery: &mut dyn Delivery,
    ) -> DispatchResult<()> {
        let callback = OneShotCallback::new();
        self.sender
            .send_push_message(
                variant,
                &batch.tokens,
                &batch.serialized_message,
                &batch.push_message_information_id,
                &callback,
            )
            .await;

        let (delivery_status, reason) = match callback.outcome() {
            Some(SendOutcome::Success) => (DeliveryStatus::Succeeded, None),
            Some(SendOutcome::Error { reason }) => (DeliveryStatus::Failed, Some(reason)),
            None => {
                // Sender never reported a terminal outcome: treat as a
                // failed batch rather than hang the worker indefinitely.
                tracing::error!(
                    push_job_id = %batch.push_message_information_id,
                    variant_id = %batch.variant_id,
                    "sender returned without a terminal callback"
                );
                (
                    DeliveryStatus::Failed,
                    Some("sender did not report a terminal outcome".to_string()),
                )
            }
        };

        if let Some(error_reason) = &reason {
            self.store
                .record_variant_error(
                    &batch.push_message_information_id,
                    &batch.variant_id,
                    error_reason.clone(),
                )
                .await?;
        }

        let metric = VariantMetricInformation {
            variant_id: batch.variant_id.clone(),
            receivers: batch.tokens.len() as u64,
            served_batches: 1,
            total_batches: 0,
            delivery_status,
            reason,
        };

        delivery.stage(
            METRICS_QUEUE,
            QueueMessage::json(&(batch.push_message_information_id.clone(), metric))?
                .with_variant_id(batch.variant_id.clone()),
        );

        Ok(())
    }
}
