//! Dead-letter sink for exhausted triggers and permanent store failures
//! (spec §7: `StorePermanent`, `TriggerExhausted`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct DeadLetterRecord {
    pub push_message_information_id: String,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, record: DeadLetterRecord);
}

/// Logs and retains dead letters in memory for inspection; a production
/// deployment swaps in a sink backed by its own durable queue.
pub struct LoggingDeadLetterSink {
    records: tokio::sync::Mutex<Vec<DeadLetterRecord>>,
}

impl LoggingDeadLetterSink {
    pub fn new() -> Self {
        Self {
            records: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn snapshot(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().await.clone()
    }
}

impl Default for LoggingDeadLetterSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeadLetterSink for LoggingDeadLetterSink {
    async fn record(&self, record: DeadLetterRecord) {
        tracing::warn!(
            push_message_information_id = %record.push_message_information_id,
            reason = %record.reason,
            "routed to dead-letter sink"
        );
        self.records.lock().await.push(record);
    }
}
