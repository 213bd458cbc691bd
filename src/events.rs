//! Completion events fired by [`crate::job_splitter`] and
//! [`crate::metrics_collector`] (spec §4.4 step 5, §4.7 step 7).
//!
//! Spec §9 re-architects the source's CDI observer graph as explicit
//! message passing: each stage is a plain function, and the trigger loop
//! observes the collector's return value directly rather than listening
//! for an event. This trait is the one place an observer-style callback
//! still makes sense — letting a pipeline embedder react to completion
//! (e.g. push a webhook) without threading a return value through every
//! caller.

pub trait PipelineEvents: Send + Sync {
    fn variant_completed(&self, push_message_information_id: &str, variant_id: &str);

    fn push_message_completed(&self, push_message_information_id: &str);
}

/// No-op sink for callers that don't need completion notifications.
pub struct NullEventSink;

impl PipelineEvents for NullEventSink {
    fn variant_completed(&self, _push_message_information_id: &str, _variant_id: &str) {}

    fn push_message_completed(&self, _push_message_information_id: &str) {}
}
