//! HTTP read-path contract (spec §6). The admin UI and HTTP server
//! themselves are out of scope (spec §1); these are the request/response
//! shapes a server implementation would bind to this crate's store and
//! cache.

use crate::model::PushMessageInformation;
use serde::{Deserialize, Serialize};

fn default_per_page() -> u32 {
    25
}

fn default_sort() -> SortOrder {
    SortOrder::Asc
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Asc
    }
}

/// `GET /rest/metrics/messages/application/{id}` query parameters.
/// `page` is zero-based; `per_page` is clamped to `[1, 100]`; an unknown
/// `sort` value falls back to ascending (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct ListPushMessagesQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_sort")]
    pub sort: SortOrder,
    #[serde(default)]
    pub search: Option<String>,
}

impl ListPushMessagesQuery {
    pub fn clamped_per_page(&self) -> u32 {
        self.per_page.clamp(1, 100)
    }
}

/// Response headers accompanying the JSON body (spec §6): `total` under
/// the search filter, `receivers`/`app_opened_counter` read from
/// [`crate::metrics_cache::MetricsCache`].
#[derive(Debug, Clone, Serialize)]
pub struct ListPushMessagesHeaders {
    pub total: u64,
    pub receivers: i64,
    pub app_opened_counter: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListPushMessagesResponse {
    pub headers: ListPushMessagesHeaders,
    pub body: Vec<PushMessageInformation>,
}

/// Selects and orders a page of `PushMessageInformation`, matching `query`
/// (full-text on raw message and id, spec §6). No I/O: callers supply the
/// already-loaded candidate set, typically everything under one
/// application id.
pub fn paginate(
    mut candidates: Vec<PushMessageInformation>,
    query: &ListPushMessagesQuery,
) -> (Vec<PushMessageInformation>, u64) {
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        candidates.retain(|info| info.id.contains(search) || info.raw_json_message.contains(search));
    }

    candidates.sort_by(|a, b| match query.sort {
        SortOrder::Asc => a.submit_date.cmp(&b.submit_date),
        SortOrder::Desc => b.submit_date.cmp(&a.submit_date),
    });

    let total = candidates.len() as u64;
    let per_page = query.clamped_per_page() as usize;
    let start = (query.page as usize).saturating_mul(per_page);
    let page = candidates.into_iter().skip(start).take(per_page).collect();
    (page, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubmitterMeta;
    use chrono::{Duration, Utc};

    fn info(id: &str, offset_secs: i64) -> PushMessageInformation {
        PushMessageInformation::new(
            id,
            "app-1",
            format!("{{\"id\":\"{id}\"}}"),
            0,
            Utc::now() + Duration::seconds(offset_secs),
            SubmitterMeta::default(),
        )
    }

    #[test]
    fn per_page_is_clamped_to_the_documented_range() {
        let query = ListPushMessagesQuery {
            page: 0,
            per_page: 500,
            sort: SortOrder::Asc,
            search: None,
        };
        assert_eq!(query.clamped_per_page(), 100);
    }

    #[test]
    fn paginate_sorts_ascending_by_default_and_applies_search() {
        let candidates = vec![info("a", 10), info("b", 0), info("c", 20)];
        let query = ListPushMessagesQuery {
            page: 0,
            per_page: 25,
            sort: SortOrder::Asc,
            search: None,
        };
        let (page, total) = paginate(candidates, &query);
        assert_eq!(total, 3);
        assert_eq!(page.iter().map(|i| i.id.clone()).collect::<Vec<_>>(), vec!["b", "a", "c"]);
    }

    #[test]
    fn search_filters_by_id_or_raw_message() {
        let candidates = vec![info("a", 0), info("b", 1)];
        let query = ListPushMessagesQuery {
            page: 0,
            per_page: 25,
            sort: SortOrder::Asc,
            search: Some("\"b\"".to_string()),
        };
        let (page, total) = paginate(candidates, &query);
        assert_eq!(total, 1);
        assert_eq!(page[0].id, "b");
    }
}
