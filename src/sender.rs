//! `PushNotificationSender` contract (spec §4.3, C3). Concrete per-network
//! transports (APNs, FCM, WebPush, ADM) are out of scope; this module only
//! fixes the interface the [`crate::dispatcher::Dispatcher`] drives.
//!
//! Grounded on the obscura push worker's error taxonomy
//! (`PushError::{Unregistered, QuotaExceeded, Other}`): a fatal/non-fatal
//! split on the callback, plus a side channel for per-token rejections
//! that are not errors at all.

use crate::model::Variant;
use async_trait::async_trait;
use std::sync::Mutex;

/// One terminal outcome of a batch send. The sender must report exactly
/// one of these exactly once per batch (spec §4.3); a second terminal call
/// is a contract violation (DESIGN.md Open Question 1), not a retriable
/// condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Success,
    Error { reason: String },
}

/// Injected collaborator a sender uses to report per-token rejections
/// (e.g. APNs `BadDeviceToken`) that are not themselves send failures.
#[async_trait]
pub trait ClientInstallationService: Send + Sync {
    async fn remove_installations_for_variant_by_device_tokens(
        &self,
        variant_id: &str,
        tokens: &[String],
    );
}

/// Receives the terminal outcome of one `send_push_message` call.
/// Implementations must tolerate being driven from any worker routine
/// concurrently with other callbacks for the same variant (spec §4.3).
#[async_trait]
pub trait SenderCallback: Send + Sync {
    async fn on_success(&self);
    async fn on_error(&self, reason: String);
}

/// A contract a concrete per-network transport conforms to. Only the
/// interface is specified here — no platform impl ships in this crate.
#[async_trait]
pub trait PushNotificationSender: Send + Sync {
    async fn send_push_message(
        &self,
        variant: &Variant,
        tokens: &[String],
        serialized_message: &str,
        push_job_id: &str,
        callback: &dyn SenderCallback,
    );
}

/// One-shot guard enforcing the "callback invoked exactly once" invariant
/// for test doubles. A real transport is trusted to honor the contract
/// itself; this type exists so mocks in this crate's own tests fail loudly
/// rather than silently double-reporting.
pub struct OneShotCallback {
    outcome: Mutex<Option<SendOutcome>>,
}

impl OneShotCallback {
    pub fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
        }
    }

    pub fn outcome(&self) -> Option<SendOutcome> {
        self.outcome.lock().expect("callback mutex poisoned").clone()
    }

    fn record(&self, outcome: SendOutcome) {
        let mut slot = self.outcome.lock().expect("callback mutex poisoned");
        if slot.is_some() {
            // Spec §4.3: the sender must call back exactly once. A second
            // terminal call is logged and ignored rather than panicking,
            // since a misbehaving transport should not take the pipeline
            // down with it.
            tracing::error!("sender invoked callback more than once");
            return;
        }
        *slot = Some(outcome);
    }
}

impl Default for OneShotCallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SenderCallback for OneShotCallback {
    async fn on_success(&self) {
        self.record(SendOutcome::Success);
    }

    async fn on_error(&self, reason: String) {
        self.record(SendOutcome::Error { reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_terminal_call_wins_and_second_is_ignored() {
        let callback = OneShotCallback::new();
        callback.on_success().await;
        callback.on_error("late".to_string()).await;
        assert_eq!(callback.outcome(), Some(SendOutcome::Success));
    }

    #[tokio::test]
    async fn records_the_error_reason() {
        let callback = OneShotCallback::new();
        callback.on_error("connect refused".to_string()).await;
        assert_eq!(
            callback.outcome(),
            Some(SendOutcome::Error {
                reason: "connect refused".to_string()
            })
        );
    }
}
