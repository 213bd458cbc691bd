//! Per-push-network tuning registry (spec §4.1, C1).
//!
//! Grounded on the teacher's `BatchConfig`: an `Option<T>`-field struct
//! with `unwrap_or(default)` accessors, read once at startup and treated
//! as immutable thereafter.

use crate::model::Platform;
use std::collections::HashMap;

/// Tuning for one platform: tokens per network transaction (`batch_size`)
/// and how many batches a single loader invocation pulls
/// (`batches_to_load`).
#[derive(Debug, Clone, Copy)]
pub struct SenderConfiguration {
    batch_size: Option<u32>,
    batches_to_load: Option<u32>,
}

impl SenderConfiguration {
    pub fn new(batch_size: u32, batches_to_load: u32) -> Self {
        Self {
            batch_size: Some(batch_size),
            batches_to_load: Some(batches_to_load),
        }
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size.unwrap_or(1000)
    }

    pub fn batches_to_load(&self) -> u32 {
        self.batches_to_load.unwrap_or(1)
    }

    /// `tokensToLoad = batchSize × batchesToLoad` (spec §4.1).
    pub fn tokens_to_load(&self) -> u32 {
        self.batch_size() * self.batches_to_load()
    }
}

/// Immutable, platform-keyed registry of [`SenderConfiguration`]s.
#[derive(Debug, Clone)]
pub struct SenderConfigRegistry {
    entries: HashMap<Platform, SenderConfiguration>,
}

impl SenderConfigRegistry {
    pub fn new(entries: HashMap<Platform, SenderConfiguration>) -> Self {
        Self { entries }
    }

    /// Conservative defaults per spec §4.1: FCM batch_size=1000; APNs
    /// batch_size=10000 with batches_to_load=1 given HTTP/2 fan-out.
    pub fn with_defaults() -> Self {
        let mut entries = HashMap::new();
        entries.insert(Platform::Android, SenderConfiguration::new(1000, 3));
        entries.insert(Platform::Ios, SenderConfiguration::new(10_000, 1));
        entries.insert(Platform::WebPush, SenderConfiguration::new(500, 2));
        entries.insert(Platform::Adm, SenderConfiguration::new(100, 2));
        entries.insert(Platform::SimplePush, SenderConfiguration::new(100, 2));
        entries.insert(Platform::Windows, SenderConfiguration::new(100, 2));
        Self { entries }
    }

    pub fn for_platform(&self, platform: Platform) -> SenderConfiguration {
        self.entries
            .get(&platform)
            .copied()
            .unwrap_or(SenderConfiguration {
                batch_size: None,
                batches_to_load: None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_to_load_multiplies_batch_size_and_batches_to_load() {
        let cfg = SenderConfiguration::new(2, 3);
        assert_eq!(cfg.tokens_to_load(), 6);
    }

    #[test]
    fn unconfigured_platform_falls_back_to_conservative_default() {
        let registry = SenderConfigRegistry::new(HashMap::new());
        let cfg = registry.for_platform(Platform::Ios);
        assert_eq!(cfg.batch_size(), 1000);
        assert_eq!(cfg.batches_to_load(), 1);
    }
}
