//! Duplicate-seed scenario: splitting the same push job twice (a retried
//! HTTP submit, or a JobSplitter redelivery) must seed each targeted
//! variant's job exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use upns_dispatch::events::PipelineEvents;
use upns_dispatch::job_splitter::JobSplitter;
use upns_dispatch::model::{MessageFilter, PushApplication, SubmitterMeta, UnifiedPushMessage, Variant};
use upns_dispatch::model::Platform;
use upns_dispatch::queues::memory::InMemoryQueues;
use upns_dispatch::queues::{variant_job_queue, Queues};
use upns_dispatch::store::{InMemoryStore, MetricsStore};

mod helpers {
    use super::*;

    #[derive(Default)]
    pub struct CountingEvents {
        pub completions: AtomicUsize,
    }

    impl PipelineEvents for CountingEvents {
        fn variant_completed(&self, _push_message_information_id: &str, _variant_id: &str) {}

        fn push_message_completed(&self, _push_message_information_id: &str) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn single_variant_app() -> PushApplication {
        PushApplication {
            id: "app-1".to_string(),
            variants: vec![Variant {
                id: "v1".to_string(),
                platform: Platform::Android,
                production: true,
            }],
        }
    }

    pub fn message_targeting(variant_ids: Vec<String>) -> UnifiedPushMessage {
        UnifiedPushMessage {
            alert: Some("hi".to_string()),
            title: None,
            badge: None,
            sound: None,
            content_available: false,
            user_data: Default::default(),
            filter: MessageFilter {
                variant_ids,
                ..Default::default()
            },
            time_to_live: None,
        }
    }
}

use helpers::*;

#[tokio::test]
async fn resplitting_the_same_job_id_seeds_the_variant_once() {
    let store = Arc::new(InMemoryStore::new());
    let queues = Arc::new(InMemoryQueues::new());
    let events = Arc::new(CountingEvents::default());
    let splitter = JobSplitter::new(store.clone(), queues.clone(), events.clone());
    let app = single_variant_app();
    let message = message_targeting(vec![]);

    // A caller might retry a submit that it believes failed; JobSplitter
    // has no idempotence of its own at the store-insert level, but the
    // *seed* VariantJob it enqueues is keyed by a deterministic dedup id
    // derived from the job id, so retrying with the same generated id
    // must not double-seed the variant.
    for _ in 0..2 {
        splitter
            .split(&message, &app, SubmitterMeta::default(), || "job-dup".to_string())
            .await
            .unwrap();
    }

    let seeded = queues
        .drain_no_wait(&variant_job_queue(Platform::Android), None)
        .await
        .unwrap();
    assert_eq!(seeded.len(), 1, "duplicate seed must be dropped by the broker");
}

#[tokio::test]
async fn distinct_job_ids_each_get_their_own_seed() {
    let store = Arc::new(InMemoryStore::new());
    let queues = Arc::new(InMemoryQueues::new());
    let events = Arc::new(CountingEvents::default());
    let splitter = JobSplitter::new(store.clone(), queues.clone(), events.clone());
    let app = single_variant_app();
    let message = message_targeting(vec![]);

    splitter
        .split(&message, &app, SubmitterMeta::default(), || "job-a".to_string())
        .await
        .unwrap();
    splitter
        .split(&message, &app, SubmitterMeta::default(), || "job-b".to_string())
        .await
        .unwrap();

    let seeded = queues
        .drain_no_wait(&variant_job_queue(Platform::Android), None)
        .await
        .unwrap();
    assert_eq!(seeded.len(), 2, "distinct job ids must not collide on dedup id");
}

#[tokio::test]
async fn filter_narrows_seeding_to_named_variants_only() {
    let store = Arc::new(InMemoryStore::new());
    let queues = Arc::new(InMemoryQueues::new());
    let events = Arc::new(CountingEvents::default());
    let splitter = JobSplitter::new(store.clone(), queues.clone(), events.clone());

    let app = PushApplication {
        id: "app-1".to_string(),
        variants: vec![
            Variant {
                id: "v1".to_string(),
                platform: Platform::Android,
                production: true,
            },
            Variant {
                id: "v2".to_string(),
                platform: Platform::Ios,
                production: true,
            },
        ],
    };
    let message = message_targeting(vec!["v2".to_string()]);

    let job_id = splitter
        .split(&message, &app, SubmitterMeta::default(), || "job-filtered".to_string())
        .await
        .unwrap();

    let info = store.load(&job_id).await.unwrap();
    assert_eq!(info.total_variants, 1, "only the filtered variant counts toward the total");

    let android_seeded = queues
        .receive_no_wait(&variant_job_queue(Platform::Android), None)
        .await
        .unwrap();
    assert!(android_seeded.is_none());

    let ios_seeded = queues
        .receive_no_wait(&variant_job_queue(Platform::Ios), None)
        .await
        .unwrap();
    assert!(ios_seeded.is_some());
}
