//! Top-level pipeline wiring (spec §9: "constructor injected dependencies
//! ... lifetimes are process-long singletons"). Builds the worker pools
//! for every stage and holds the shared collaborators they're constructed
//! from. Owning a `Pipeline` and calling [`Pipeline::spawn`] is the one
//! entry point an embedding binary needs.

use crate::config::PipelineConfig;
use crate::dead_letter::DeadLetterSink;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchResult;
use crate::events::PipelineEvents;
use crate::job_splitter::JobSplitter;
use crate::loader_worker::LoaderWorker;
use crate::metrics_cache::MetricsCache;
use crate::metrics_collector::MetricsCollector;
use crate::model::{BatchJob, Platform, VariantJob};
use crate::queues::{batch_queue, variant_job_queue, Queues, TRIGGER_QUEUE, METRICS_QUEUE};
use crate::sender::PushNotificationSender;
use crate::sender_config::SenderConfigRegistry;
use crate::store::{MetricsStore, TokenLoader, VariantDirectory};
use crate::trigger_loop::TriggerLoop;
use crate::worker_pool::spawn_worker_pool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Per-platform registry of concrete senders (spec §4.3: "concrete
/// platform transports... out of core; contract only" — this is the slot
/// an embedder fills).
#[derive(Clone, Default)]
pub struct SenderRegistry {
    senders: HashMap<Platform, Arc<dyn PushNotificationSender>>,
}

impl SenderRegistry {
    pub fn new(senders: HashMap<Platform, Arc<dyn PushNotificationSender>>) -> Self {
        Self { senders }
    }

    pub fn for_platform(&self, platform: Platform) -> DispatchResult<Arc<dyn PushNotificationSender>> {
        self.senders
            .get(&platform)
            .cloned()
            .ok_or_else(|| crate::error::DispatchError::Configuration(format!("no sender registered for {platform}")))
    }
}

pub struct Pipeline<S, L, Q, E, D> {
    store: Arc<S>,
    token_loader: Arc<L>,
    queues: Arc<Q>,
    cache: Arc<MetricsCache>,
    events: Arc<E>,
    dead_letters: Arc<D>,
    variant_directory: Arc<dyn VariantDirectory>,
    sender_config: Arc<SenderConfigRegistry>,
    senders: SenderRegistry,
    config: PipelineConfig,
}

impl<S, L, Q, E, D> Pipeline<S, L, Q, E, D>
where
    S: MetricsStore + 'static,
    L: TokenLoader + 'static,
    Q: Queues + 'static,
    E: PipelineEvents + 'static,
    D: DeadLetterSink + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        token_loader: Arc<L>,
        queues: Arc<Q>,
        cache: Arc<MetricsCache>,
        events: Arc<E>,
        dead_letters: Arc<D>,
        variant_directory: Arc<dyn VariantDirectory>,
        senders: SenderRegistry,
        config: PipelineConfig,
    ) -> Self {
        let sender_config = Arc::new(config.senders.clone());
        Self {
            store,
            token_loader,
            queues,
            cache,
            events,
            dead_letters,
            variant_directory,
            sender_config,
            senders,
            config,
        }
    }

    pub fn job_splitter(&self) -> JobSplitter<S, Q, E> {
        JobSplitter::new(self.store.clone(), self.queues.clone(), self.events.clone())
    }

    /// Split `message` for `app`, generating the new push job's id with
    /// [`crate::job_splitter::generate_job_id`]. Most callers want this
    /// over calling [`JobSplitter::split`] directly.
    pub async fn submit(
        &self,
        message: &crate::model::UnifiedPushMessage,
        app: &crate::model::PushApplication,
        meta: crate::model::SubmitterMeta,
    ) -> DispatchResult<String> {
        self.job_splitter()
            .split(message, app, meta, crate::job_splitter::generate_job_id)
            .await
    }

    /// Spawns every stage's worker pool and returns their join handles.
    /// `platforms` is the set of push networks this process loads/dispatches
    /// for; `shutdown` is shared across every worker (spec §5).
    pub fn spawn(&self, platforms: &[Platform], shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for &platform in platforms {
            handles.extend(self.spawn_loader_pool(platform, shutdown.clone()));
            handles.extend(self.spawn_dispatcher_pool(platform, shutdown.clone()));
        }

        handles.extend(self.spawn_collector_pool(shutdown.clone()));
        handles.extend(self.spawn_trigger_pool(shutdown));

        handles
    }

    fn spawn_loader_pool(&self, platform: Platform, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let worker = Arc::new(LoaderWorker::new(
            self.token_loader.clone(),
            self.queues.clone(),
            self.sender_config.clone(),
            platform,
            self.config.trigger_redelivery_delay,
        ));

        spawn_worker_pool(
            self.queues.clone(),
            variant_job_queue(platform),
            self.config.worker_pools.loader_workers,
            shutdown,
            move |mut delivery| {
                let worker = worker.clone();
                async move {
                    let outcome: DispatchResult<()> = async {
                        let job: VariantJob = delivery.message().deserialize()?;
                        worker.process(&job, delivery.as_mut()).await
                    }
                    .await;

                    match outcome {
                        Ok(()) => {
                            if let Err(error) = delivery.commit().await {
                                tracing::error!(%error, "failed to commit loader delivery");
                            }
                        }
                        Err(error) => {
                            tracing::warn!(%error, "loader worker failed, rolling back");
                            if let Err(rollback_error) = delivery.rollback().await {
                                tracing::error!(%rollback_error, "failed to roll back loader delivery");
                            }
                        }
                    }
                }
            },
        )
    }

    fn spawn_dispatcher_pool(&self, platform: Platform, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let sender = match self.senders.for_platform(platform) {
            Ok(sender) => sender,
            Err(error) => {
                tracing::warn!(%error, %platform, "no sender registered, skipping dispatcher pool");
                return Vec::new();
            }
        };
        let dispatcher = Arc::new(Dispatcher::new(self.store.clone(), sender));
        let variant_directory = self.variant_directory.clone();

        spawn_worker_pool(
            self.queues.clone(),
            batch_queue(platform),
            self.config.worker_pools.dispatcher_workers,
            shutdown,
            move |mut delivery| {
                let dispatcher = dispatcher.clone();
                let variant_directory = variant_directory.clone();
                async move {
                    let outcome: DispatchResult<()> = async {
                        let batch: BatchJob = delivery.message().deserialize()?;
                        let variant = variant_directory
                            .variant(&batch.variant_id)
                            .ok_or_else(|| crate::error::DispatchError::NotFound(batch.variant_id.clone()))?;
                        dispatcher.process(&batch, &variant, delivery.as_mut()).await
                    }
                    .await;

                    match outcome {
                        Ok(()) => {
                            if let Err(error) = delivery.commit().await {
                                tracing::error!(%error, "failed to commit dispatcher delivery");
                            }
                        }
                        Err(error) => {
                            tracing::warn!(%error, "dispatcher failed, rolling back");
                            if let Err(rollback_error) = delivery.rollback().await {
                                tracing::error!(%rollback_error, "failed to roll back dispatcher delivery");
                            }
                        }
                    }
                }
            },
        )
    }

    fn spawn_collector_pool(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let collector = Arc::new(MetricsCollector::new(
            self.store.clone(),
            self.queues.clone(),
            self.cache.clone(),
            self.events.clone(),
        ));

        spawn_worker_pool(
            self.queues.clone(),
            METRICS_QUEUE,
            self.config.worker_pools.collector_workers,
            shutdown,
            move |mut delivery| {
                let collector = collector.clone();
                async move {
                    let outcome: DispatchResult<()> = async {
                        let (push_id, vmi): (String, crate::model::VariantMetricInformation) =
                            delivery.message().deserialize()?;
                        collector.handle_metric(&push_id, vmi, delivery.as_mut()).await?;
                        Ok(())
                    }
                    .await;

                    match outcome {
                        Ok(()) => {
                            if let Err(error) = delivery.commit().await {
                                tracing::error!(%error, "failed to commit collector delivery");
                            }
                        }
                        Err(error) => {
                            tracing::warn!(%error, "collector failed, rolling back");
                            if let Err(rollback_error) = delivery.rollback().await {
                                tracing::error!(%rollback_error, "failed to roll back collector delivery");
                            }
                        }
                    }
                }
            },
        )
    }

    fn spawn_trigger_pool(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let collector = Arc::new(MetricsCollector::new(
            self.store.clone(),
            self.queues.clone(),
            self.cache.clone(),
            self.events.clone(),
        ));
        let trigger_loop = Arc::new(TriggerLoop::new(
            collector,
            self.dead_letters.clone(),
            self.config.trigger_max_redeliveries,
        ));

        spawn_worker_pool(
            self.queues.clone(),
            TRIGGER_QUEUE,
            self.config.worker_pools.trigger_workers,
            shutdown,
            move |delivery| {
                let trigger_loop = trigger_loop.clone();
                async move {
                    let should_commit = match trigger_loop.process(delivery.as_ref()).await {
                        Ok(should_commit) => should_commit,
                        Err(error) => {
                            tracing::error!(%error, "trigger loop failed");
                            false
                        }
                    };

                    let result = if should_commit {
                        delivery.commit().await
                    } else {
                        delivery.rollback().await
                    };
                    if let Err(error) = result {
                        tracing::error!(%error, "failed to finalize trigger delivery");
                    }
                }
            },
        )
    }
}
