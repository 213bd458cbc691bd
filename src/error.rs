//! Crate-wide error type.
//!
//! One variant per failure category in spec §7. `retriable()` tells a
//! worker whether to roll back its transaction (the broker redelivers) or
//! record the failure and move on, per §7's propagation policy:
//! infrastructure errors are retried, per-batch/application errors are
//! recorded, not retried.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Retriable store I/O failure. Rolls back the enclosing transaction.
    #[error("store transient error: {0}")]
    StoreTransient(String),

    /// Non-retriable store failure (e.g. schema mismatch). Logged and sent
    /// to the dead-letter sink rather than redelivered.
    #[error("store permanent error: {0}")]
    StorePermanent(String),

    /// Sender could not reach the upstream platform. Recorded as a failed
    /// batch, not retried at the pipeline level.
    #[error("sender connect error: {0}")]
    SenderConnect(String),

    /// Sender rejected the payload as too large. Recorded as a failed
    /// batch, not retried.
    #[error("sender payload too large: {0}")]
    SenderPayloadTooLarge(String),

    /// A trigger was redelivered past the configured maximum. Routed to
    /// the dead-letter sink; the push job's metrics remain indeterminate.
    #[error("trigger exhausted after {attempts} redeliveries for push {push_id}")]
    TriggerExhausted { push_id: String, attempts: u32 },

    /// The queue backend rejected an enqueue/receive/commit.
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Message body could not be encoded/decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid or missing configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Timed out acquiring a per-key advisory lock.
    #[error("operation timed out: {0}")]
    OperationTimeout(String),

    /// A wait was abandoned because of an external cancellation signal.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The requested application or variant does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl DispatchError {
    /// Whether a worker should roll back and let the broker redeliver, as
    /// opposed to recording the failure and moving on (§7).
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            DispatchError::StoreTransient(_) | DispatchError::QueueUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
