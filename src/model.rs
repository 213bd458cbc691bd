//! Core data model (spec §3).
//!
//! Plain, serializable types for the entities the pipeline moves between
//! stages and persists. Mirrors the teacher's `model` module shape: small
//! structs/enums, `Serialize`/`Deserialize` where the type crosses a queue
//! or store boundary, `Display` where useful for logging.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One push-network platform a [`Variant`] can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Ios,
    Android,
    WebPush,
    Adm,
    SimplePush,
    Windows,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::WebPush => "webpush",
            Platform::Adm => "adm",
            Platform::SimplePush => "simplepush",
            Platform::Windows => "windows",
        };
        write!(f, "{name}")
    }
}

/// A registered application, owning one or more [`Variant`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushApplication {
    pub id: String,
    pub variants: Vec<Variant>,
}

/// One delivery target group within an application (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub platform: Platform,
    pub production: bool,
}

/// One device registration under a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    pub token: String,
    pub variant_id: String,
    pub categories: Vec<String>,
    pub alias: Option<String>,
    pub device_type: Option<String>,
}

/// Narrows a token-load or variant resolution to a subset of
/// installations. All fields are ANDed together; an empty list in a
/// field means "no filter on this dimension".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageFilter {
    pub variant_ids: Vec<String>,
    pub categories: Vec<String>,
    pub aliases: Vec<String>,
    pub device_types: Vec<String>,
}

/// The caller's push request (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedPushMessage {
    pub alert: Option<String>,
    pub title: Option<String>,
    pub badge: Option<i32>,
    pub sound: Option<String>,
    pub content_available: bool,
    #[serde(default)]
    pub user_data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub filter: MessageFilter,
    pub time_to_live: Option<u64>,
}

/// Submitter metadata recorded alongside a [`PushMessageInformation`] but
/// not otherwise interpreted by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitterMeta {
    pub ip_address: Option<String>,
    pub client_identifier: Option<String>,
}

/// Three-valued delivery status lattice (spec §9: "application-level
/// lattice meet over {unset, true, false}"). `Unset` is the bottom
/// element; `Failed` is sticky — the meet of `Failed` with anything is
/// `Failed` (invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Unset,
    Succeeded,
    Failed,
}

impl Default for DeliveryStatus {
    fn default() -> Self {
        DeliveryStatus::Unset
    }
}

impl DeliveryStatus {
    /// Meet of two statuses under the {unset < succeeded, unset < failed}
    /// lattice where `Failed` dominates `Succeeded` (invariant 5).
    pub fn meet(self, other: DeliveryStatus) -> DeliveryStatus {
        use DeliveryStatus::*;
        match (self, other) {
            (Unset, other) => other,
            (existing, Unset) => existing,
            (Failed, _) | (_, Failed) => Failed,
            (Succeeded, Succeeded) => Succeeded,
        }
    }
}

/// Aggregated per-variant counters (spec §3, §4.7).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantMetricInformation {
    pub variant_id: String,
    pub receivers: u64,
    pub served_batches: u64,
    pub total_batches: u64,
    pub delivery_status: DeliveryStatus,
    pub reason: Option<String>,
}

impl VariantMetricInformation {
    pub fn new(variant_id: impl Into<String>) -> Self {
        Self {
            variant_id: variant_id.into(),
            ..Default::default()
        }
    }

    /// True once every loaded batch for this variant has been served
    /// (invariant 2's completion condition, without yet knowing whether
    /// the terminal `AllBatchesLoaded` marker has arrived — see
    /// [`crate::metrics_collector`]).
    pub fn counts_converged(&self) -> bool {
        self.total_batches == self.served_batches
    }

    /// Merge another update into `self` per §4.7.1.
    pub fn merge(&mut self, update: &VariantMetricInformation) {
        self.receivers += update.receivers;
        self.served_batches += update.served_batches;
        self.total_batches += update.total_batches;
        self.delivery_status = self.delivery_status.meet(update.delivery_status);
        if self.reason.is_none() {
            self.reason = update.reason.clone();
        }
    }
}

/// One recorded transport rejection (spec §3, wired per DESIGN.md Open
/// Question 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantErrorStatus {
    pub push_job_id: String,
    pub variant_id: String,
    pub error_reason: String,
}

impl VariantErrorStatus {
    pub fn compound_id(&self) -> String {
        format!("{}:{}", self.push_job_id, self.variant_id)
    }
}

/// The persisted aggregate for one submitted push job (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessageInformation {
    pub id: String,
    pub app_id: String,
    pub raw_json_message: String,
    pub submit_date: chrono::DateTime<chrono::Utc>,
    pub meta: SubmitterMeta,
    pub total_receivers: u64,
    pub served_variants: u32,
    pub total_variants: u32,
    pub variant_informations: HashMap<String, VariantMetricInformation>,
}

impl PushMessageInformation {
    pub fn new(
        id: impl Into<String>,
        app_id: impl Into<String>,
        raw_json_message: String,
        total_variants: u32,
        submit_date: chrono::DateTime<chrono::Utc>,
        meta: SubmitterMeta,
    ) -> Self {
        Self {
            id: id.into(),
            app_id: app_id.into(),
            raw_json_message,
            submit_date,
            meta,
            total_receivers: 0,
            served_variants: 0,
            total_variants,
            variant_informations: HashMap::new(),
        }
    }

    /// Invariant 3's completion condition.
    pub fn is_complete(&self) -> bool {
        self.served_variants == self.total_variants
    }
}

/// Work item enqueued for token loading (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantJob {
    pub push_message_information_id: String,
    pub variant_id: String,
    pub serialized_message: String,
    pub last_token_page_cursor: Option<String>,
}

/// One unit of sender work (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub push_message_information_id: String,
    pub variant_id: String,
    pub serialized_message: String,
    pub tokens: Vec<String>,
    pub is_last_batch: bool,
}
