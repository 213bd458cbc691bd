//! `JobSplitter` (spec §4.4, C6): turns one `UnifiedPushMessage` into the
//! seed `VariantJob`s that drive the rest of the pipeline.

use crate::error::DispatchResult;
use crate::events::PipelineEvents;
use crate::model::{
    PushApplication, PushMessageInformation, SubmitterMeta, UnifiedPushMessage, Variant,
    VariantJob, VariantMetricInformation,
};
use crate::queues::{variant_job_queue, QueueMessage, Queues};
use crate::store::MetricsStore;
use std::sync::Arc;

/// Default `new_job_id` generator for production callers. Tests supply
/// their own deterministic closure instead.
pub fn generate_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct JobSplitter<S, Q, C> {
    store: Arc<S>,
    queues: Arc<Q>,
    completion: Arc<C>,
}

impl<S, Q, C> JobSplitter<S, Q, C>
where
    S: MetricsStore,
    Q: Queues,
    C: PipelineEvents,
{
    pub fn new(store: Arc<S>, queues: Arc<Q>, completion: Arc<C>) -> Self {
        Self {
            store,
            queues,
            completion,
        }
    }

    fn resolve_targeted_variants<'a>(
        app: &'a PushApplication,
        message: &UnifiedPushMessage,
    ) -> Vec<&'a Variant> {
        app.variants
            .iter()
            .filter(|v| {
                message.filter.variant_ids.is_empty()
                    || message.filter.variant_ids.contains(&v.id)
            })
            .collect()
    }

    /// Split `message` for `app`, returning the new push job's id.
    pub async fn split(
        &self,
        message: &UnifiedPushMessage,
        app: &PushApplication,
        meta: SubmitterMeta,
        new_job_id: impl FnOnce() -> String,
    ) -> DispatchResult<String> {
        let targeted = Self::resolve_targeted_variants(app, message);
        let raw_json = serde_json::to_string(message)?;
        let job_id = new_job_id();

        let mut info = PushMessageInformation::new(
            job_id.clone(),
            app.id.clone(),
            raw_json.clone(),
            targeted.len() as u32,
            chrono::Utc::now(),
            meta,
        );
        // Seed a zero-valued entry per targeted variant up front, not just
        // on its first BatchLoaded marker: a variant whose token page comes
        // back empty on the loader's very first call never produces one, and
        // reconcile_variant only ever looks at variants already on record.
        for variant in &targeted {
            info.variant_informations
                .insert(variant.id.clone(), VariantMetricInformation::new(variant.id.clone()));
        }
        self.store.insert(info).await?;

        if targeted.is_empty() {
            self.store
                .update_with(&job_id, |info| {
                    info.served_variants = 0;
                })
                .await?;
            self.completion.push_message_completed(&job_id);
            return Ok(job_id);
        }

        for variant in targeted {
            let dedup_id = format!("{job_id}:{}:seed", variant.id);
            let job = VariantJob {
                push_message_information_id: job_id.clone(),
                variant_id: variant.id.clone(),
                serialized_message: raw_json.clone(),
                last_token_page_cursor: None,
            };
            let queue_message = QueueMessage::json(&job)?
                .with_variant_id(variant.id.clone())
                .with_dedup_id(dedup_id);
            self.queues
                .enqueue(&variant_job_queue(variant.platform), queue_message)
                .await?;
        }

        Ok(job_id)
    }
}
