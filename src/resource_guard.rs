//! Lock-acquisition helper shared by store implementations.
//!
//! The collector (§4.7) and the trigger loop (§4.8) both need to serialize
//! updates to a single `PushMessageInformation` per `pushId` (spec §5); a
//! store backs that with a per-key advisory lock, acquired through here so
//! every caller gets the same timeout/cancellation behavior.

use crate::error::{DispatchError, DispatchResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Acquire `mutex` within `timeout_duration`, or bail with
/// [`DispatchError::OperationTimeout`]. If `cancel_token` fires first the
/// wait is abandoned with [`DispatchError::Cancelled`].
pub async fn acquire_lock_with_timeout<'a, T>(
    mutex: &'a Arc<Mutex<T>>,
    operation_name: &str,
    timeout_duration: Duration,
    cancel_token: Option<&CancellationToken>,
) -> DispatchResult<tokio::sync::MutexGuard<'a, T>> {
    let lock_future = mutex.lock();

    if let Some(token) = cancel_token {
        tokio::select! {
            guard = timeout(timeout_duration, lock_future) => {
                guard.map_err(|_| {
                    log::error!("timed out acquiring lock for {operation_name} after {timeout_duration:?}");
                    DispatchError::OperationTimeout(operation_name.to_string())
                })
            }
            _ = token.cancelled() => {
                log::warn!("lock acquisition for {operation_name} was cancelled");
                Err(DispatchError::Cancelled(operation_name.to_string()))
            }
        }
    } else {
        timeout(timeout_duration, lock_future).await.map_err(|_| {
            log::error!("timed out acquiring lock for {operation_name} after {timeout_duration:?}");
            DispatchError::OperationTimeout(operation_name.to_string())
        })
    }
}
