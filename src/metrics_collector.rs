//! `MetricsCollector` state machine (spec §4.7, C7) — the crux of the
//! pipeline. Folds durable, broker-counted markers into per-variant and
//! per-job counters and detects completion.
//!
//! The trigger loop (§4.8) re-invokes the collector "for
//! `t.pushMessageInformationId`" without a fresh `VariantMetricInformation`
//! — it is re-checking convergence, not delivering new data. [`recheck`]
//! implements that: it re-runs the per-variant reconciliation step (§4.7
//! steps 3–7) against every variant already on record for the job,
//! without touching `receivers`/`servedBatches` again. [`handle_metric`]
//! is the entry point driven by `MetricsQueue` and runs the full
//! steps 1–8 for the one variant a delivered `vmi` names.

use crate::error::DispatchResult;
use crate::events::PipelineEvents;
use crate::metrics_cache::MetricsCache;
use crate::model::VariantMetricInformation;
use crate::queues::{Delivery, Queues, Selector, ALL_BATCHES_LOADED_QUEUE, BATCH_LOADED_QUEUE};
use crate::store::MetricsStore;
use std::sync::Arc;

pub struct MetricsCollector<S, Q, E> {
    store: Arc<S>,
    queues: Arc<Q>,
    cache: Arc<MetricsCache>,
    events: Arc<E>,
}

impl<S, Q, E> MetricsCollector<S, Q, E>
where
    S: MetricsStore,
    Q: Queues,
    E: PipelineEvents,
{
    pub fn new(store: Arc<S>, queues: Arc<Q>, cache: Arc<MetricsCache>, events: Arc<E>) -> Self {
        Self {
            store,
            queues,
            cache,
            events,
        }
    }

    /// Steps 1–8 of spec §4.7, driven by one `MetricsQueue` delivery.
    /// `delivery` is never staged onto further queues — the collector's
    /// only broker interaction besides its own receive is the
    /// `receiveNoWait` drains in [`Self::reconcile_variant`] — but it is
    /// still passed through so the caller can commit/rollback atomically
    /// around the store write.
    pub async fn handle_metric(
        &self,
        push_id: &str,
        mut vmi: VariantMetricInformation,
        _delivery: &mut dyn Delivery,
    ) -> DispatchResult<bool> {
        let selector = Selector::VariantId(vmi.variant_id.clone());
        let loaded = self
            .queues
            .drain_no_wait(BATCH_LOADED_QUEUE, Some(&selector))
            .await?
            .len() as u64;
        vmi.total_batches += loaded;

        let info = self
            .store
            .update_with(push_id, |info| {
                info.total_receivers += vmi.receivers;
                info.variant_informations
                    .entry(vmi.variant_id.clone())
                    .and_modify(|existing| existing.merge(&vmi))
                    .or_insert_with(|| vmi.clone());
            })
            .await?;
        // One cache bump per incoming metric, keyed off this message's own
        // receiver count, not the job's running total (that would
        // double-count every call after the first).
        self.cache.record_update(&info.app_id, vmi.receivers);

        self.reconcile_variant(push_id, &vmi.variant_id).await
    }

    /// Re-check convergence for every variant already recorded for
    /// `push_id`, without folding in new receiver/batch counts. Used by
    /// the trigger loop (§4.8) to revisit a job whose guard previously
    /// failed. Returns whether `PushMessageCompleted` fired during this
    /// call.
    pub async fn recheck(&self, push_id: &str) -> DispatchResult<bool> {
        let info = self.store.load(push_id).await?;
        let variant_ids: Vec<String> = info.variant_informations.keys().cloned().collect();

        let mut completed = false;
        for variant_id in variant_ids {
            if self.reconcile_variant(push_id, &variant_id).await? {
                completed = true;
            }
        }
        Ok(completed)
    }

    /// Step 7: if the variant's counts have converged and its terminal
    /// marker is available, fire completion events and advance
    /// `servedVariants`. Returns whether `PushMessageCompleted` fired.
    async fn reconcile_variant(&self, push_id: &str, variant_id: &str) -> DispatchResult<bool> {
        let info = self.store.load(push_id).await?;
        let Some(current) = info.variant_informations.get(variant_id) else {
            return Ok(false);
        };
        if !current.counts_converged() {
            return Ok(false);
        }

        let selector = Selector::VariantId(variant_id.to_string());
        let terminal_marker = self
            .queues
            .receive_no_wait(ALL_BATCHES_LOADED_QUEUE, Some(&selector))
            .await?;
        let Some(_marker) = terminal_marker else {
            return Ok(false);
        };

        self.events.variant_completed(push_id, variant_id);

        // served_variants is a convergence bookkeeping field, not a new
        // message arriving, so it does not touch the cache (§4.9 counters
        // only advance from handle_metric's per-message delta).
        let info = self
            .store
            .update_with(push_id, |info| {
                info.served_variants += 1;
            })
            .await?;

        if info.is_complete() {
            self.events.push_message_completed(push_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
