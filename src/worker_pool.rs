//! Generic per-stage worker loop (spec §5: "Multiple worker pools... one
//! per logical stage"). Grounded on the same `tokio::select!` shape the
//! obscura push worker uses for its shutdown-aware polling loop: race the
//! next unit of work against a shutdown signal, and stop polling — without
//! aborting in-flight work — once it fires.

use crate::queues::{Delivery, Queues};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Repeatedly receives from `queue_name` and runs `handler` on each
/// delivery until `shutdown` reports `true`. A single iteration's transaction
/// commit/rollback is `handler`'s responsibility — the loop only decides
/// whether to keep polling.
pub async fn run_worker_loop<Q, H, Fut>(
    queues: Arc<Q>,
    queue_name: String,
    mut shutdown: watch::Receiver<bool>,
    handler: H,
) where
    Q: Queues + 'static,
    H: Fn(Box<dyn Delivery>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    while !*shutdown.borrow() {
        tokio::select! {
            received = queues.receive(&queue_name) => {
                match received {
                    Ok(delivery) => handler(delivery).await,
                    Err(error) => {
                        tracing::error!(%error, queue = %queue_name, "failed to receive from queue");
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!(queue = %queue_name, "worker loop shutting down");
}

/// Spawns `worker_count` independent [`run_worker_loop`] tasks against the
/// same queue, all sharing one `shutdown` signal (spec §5: concurrency
/// arises across workers of a pool, not within one).
pub fn spawn_worker_pool<Q, H, Fut>(
    queues: Arc<Q>,
    queue_name: impl Into<String>,
    worker_count: usize,
    shutdown: watch::Receiver<bool>,
    handler: H,
) -> Vec<JoinHandle<()>>
where
    Q: Queues + 'static,
    H: Fn(Box<dyn Delivery>) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = ()> + Send,
{
    let queue_name = queue_name.into();
    (0..worker_count)
        .map(|_| {
            tokio::spawn(run_worker_loop(
                queues.clone(),
                queue_name.clone(),
                shutdown.clone(),
                handler.clone(),
            ))
        })
        .collect()
}
