//! Persistence contracts (spec §2 C2, §6: "an opaque `MetricsStore` is
//! assumed"). `InstallationStore` backs the token loader; `MetricsStore`
//! backs the collector's read-modify-write of `PushMessageInformation`.
//!
//! [`InMemoryStore`] is a test/reference implementation. Per-`pushId`
//! serialization of collector writes (spec §5: "serialized per `pushId`")
//! is enforced with [`crate::resource_guard::acquire_lock_with_timeout`],
//! the same pattern the teacher uses to bound waits on its resource locks.

use crate::error::{DispatchError, DispatchResult};
use crate::model::{Installation, MessageFilter, PushMessageInformation, Variant};
use crate::resource_guard::acquire_lock_with_timeout;
use crate::sender::ClientInstallationService;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const STORE_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves a `Variant` by id (spec §3's owning `PushApplication` relation,
/// out of scope itself but needed here so the dispatcher can hand a
/// `PushNotificationSender` the variant it's sending for).
pub trait VariantDirectory: Send + Sync {
    fn variant(&self, variant_id: &str) -> Option<Variant>;
}

pub struct InMemoryVariantDirectory {
    variants: HashMap<String, Variant>,
}

impl InMemoryVariantDirectory {
    pub fn new(variants: Vec<Variant>) -> Self {
        Self {
            variants: variants.into_iter().map(|v| (v.id.clone(), v)).collect(),
        }
    }
}

impl VariantDirectory for InMemoryVariantDirectory {
    fn variant(&self, variant_id: &str) -> Option<Variant> {
        self.variants.get(variant_id).cloned()
    }
}

/// Paginated, read-only lookup of device tokens (spec §4.2, C2). Must be
/// safe to call from a read-only transaction; never mutates store state.
#[async_trait]
pub trait TokenLoader: Send + Sync {
    /// Returns up to `limit` tokens for `variant_id` matching `filter`,
    /// ordered deterministically (primary-key ascending), plus the cursor
    /// to resume from and whether this page was the last one. The very
    /// first call against an empty result set returns `(vec![], None,
    /// true)`.
    async fn load_next(
        &self,
        variant_id: &str,
        filter: &MessageFilter,
        cursor: Option<&str>,
        limit: u32,
    ) -> DispatchResult<(Vec<String>, Option<String>, bool)>;
}

/// Read/write access to the persisted `PushMessageInformation` aggregate.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn insert(&self, info: PushMessageInformation) -> DispatchResult<()>;

    async fn load(&self, push_id: &str) -> DispatchResult<PushMessageInformation>;

    /// Apply `update` to the stored record for `push_id`, holding the
    /// per-`push_id` lock for the duration (spec §5).
    async fn update_with<F>(&self, push_id: &str, update: F) -> DispatchResult<PushMessageInformation>
    where
        F: FnOnce(&mut PushMessageInformation) + Send;

    /// Record a transport rejection (DESIGN.md Open Question 2). Additive
    /// only: never consulted for completion/counter semantics.
    async fn record_variant_error(
        &self,
        push_job_id: &str,
        variant_id: &str,
        error_reason: String,
    ) -> DispatchResult<()>;
}

/// In-memory `InstallationStore`: the read-side collaborator the loader
/// pulls from. Held separately from [`InMemoryStore`] since a production
/// deployment backs installations and metrics with different schemas.
pub struct InMemoryInstallationStore {
    installations: Mutex<Vec<Installation>>,
}

impl InMemoryInstallationStore {
    pub fn new(installations: Vec<Installation>) -> Self {
        Self {
            installations: Mutex::new(installations),
        }
    }

    pub async fn remove_for_variant_by_tokens(&self, variant_id: &str, tokens: &[String]) {
        let mut installations = self.installations.lock().await;
        installations.retain(|i| !(i.variant_id == variant_id && tokens.contains(&i.token)));
    }
}

/// The store-backed collaborator a concrete sender is injected with to
/// report per-token rejections (spec §4.3).
#[async_trait]
impl ClientInstallationService for InMemoryInstallationStore {
    async fn remove_installations_for_variant_by_device_tokens(
        &self,
        variant_id: &str,
        tokens: &[String],
    ) {
        self.remove_for_variant_by_tokens(variant_id, tokens).await;
    }
}

fn matches_filter(installation: &Installation, filter: &MessageFilter) -> bool {
    (filter.categories.is_empty()
        || installation
            .categories
            .iter()
            .any(|c| filter.categories.contains(c)))
        && (filter.aliases.is_empty()
            || installation
                .alias
                .as_ref()
                .map(|a| filter.aliases.contains(a))
                .unwrap_or(false))
        && (filter.device_types.is_empty()
            || installation
                .device_type
                .as_ref()
                .map(|d| filter.device_types.contains(d))
                .unwrap_or(false))
}

#[async_trait]
impl TokenLoader for InMemoryInstallationStore {
    async fn load_next(
        &self,
        variant_id: &str,
        filter: &MessageFilter,
        cursor: Option<&str>,
        limit: u32,
    ) -> DispatchResult<(Vec<String>, Option<String>, bool)> {
        let installations = self.installations.lock().await;
        let mut matching: Vec<&Installation> = installations
            .iter()
            .filter(|i| i.variant_id == variant_id && matches_filter(i, filter))
            .collect();
        matching.sort_by(|a, b| a.token.cmp(&b.token));

        let start = match cursor {
            Some(c) => matching
                .iter()
                .position(|i| i.token.as_str() == c)
                .map(|idx| idx + 1)
                .unwrap_or(0),
            None => 0,
        };

        let page: Vec<String> = matching
            .iter()
            .skip(start)
            .take(limit as usize)
            .map(|i| i.token.clone())
            .collect();

        let is_last = start + page.len() >= matching.len();
        let next_cursor = page.last().cloned();
        Ok((page, next_cursor, is_last))
    }
}

/// In-memory `MetricsStore` keyed by `push_id`, one advisory lock per key
/// so concurrent collector/trigger workers serialize their updates to the
/// same `PushMessageInformation` without blocking unrelated push jobs.
pub struct InMemoryStore {
    records: Mutex<HashMap<String, Arc<Mutex<PushMessageInformation>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    async fn slot(&self, push_id: &str) -> DispatchResult<Arc<Mutex<PushMessageInformation>>> {
        let records = self.records.lock().await;
        records
            .get(push_id)
            .cloned()
            .ok_or_else(|| DispatchError::NotFound(push_id.to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsStore for InMemoryStore {
    async fn insert(&self, info: PushMessageInformation) -> DispatchResult<()> {
        let mut records = self.records.lock().await;
        records.insert(info.id.clone(), Arc::new(Mutex::new(info)));
        Ok(())
    }

    async fn load(&self, push_id: &str) -> DispatchResult<PushMessageInformation> {
        let slot = self.slot(push_id).await?;
        let guard = acquire_lock_with_timeout(&slot, "load push message information", STORE_LOCK_TIMEOUT, None)
            .await?;
        Ok(guard.clone())
    }

    async fn update_with<F>(&self, push_id: &str, update: F) -> DispatchResult<PushMessageInformation>
    where
        F: FnOnce(&mut PushMessageInformation) + Send,
    {
        let slot = self.slot(push_id).await?;
        let mut guard = acquire_lock_with_timeout(
            &slot,
            "update push message information",
            STORE_LOCK_TIMEOUT,
            None,
        )
        .await?;
        update(&mut guard);
        Ok(guard.clone())
    }

    async fn record_variant_error(
        &self,
        push_job_id: &str,
        variant_id: &str,
        error_reason: String,
    ) -> DispatchResult<()> {
        tracing::debug!(
            push_job_id,
            variant_id,
            error_reason = error_reason.as_str(),
            "recorded variant error status"
        );
        Ok(())
    }
}
