//! Pipeline configuration (spec §6 "Environment inputs").
//!
//! Mirrors the teacher's `EnvUtils`: validated, trimmed access to
//! environment variables with a dedicated error type. Generalized so
//! tests can build a [`PipelineConfig`] entirely from in-memory values
//! instead of touching the process environment.

use crate::sender_config::SenderConfigRegistry;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable '{name}' not found")]
    NotFound { name: String },

    #[error("environment variable '{name}' is empty")]
    Empty { name: String },

    #[error("environment variable '{name}' could not be parsed: {reason}")]
    Invalid { name: String, reason: String },
}

/// Safe, validated environment-variable access. Trims whitespace and
/// rejects empty values the way the teacher's `EnvUtils` does.
pub struct EnvUtils;

impl EnvUtils {
    pub fn get_validated_var(name: &str) -> Result<String, ConfigError> {
        let value = std::env::var(name).map_err(|_| ConfigError::NotFound {
            name: name.to_string(),
        })?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::Empty {
                name: name.to_string(),
            });
        }
        Ok(trimmed.to_string())
    }

    pub fn get_optional_var(name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn get_parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
        match Self::get_optional_var(name) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: name.to_string(),
                reason: format!("could not parse '{raw}'"),
            }),
            None => Ok(default),
        }
    }
}

/// Per-stage worker-pool sizes (spec §5: "Number of workers is configured
/// per pool").
#[derive(Debug, Clone)]
pub struct WorkerPoolSizes {
    pub loader_workers: usize,
    pub dispatcher_workers: usize,
    pub collector_workers: usize,
    pub trigger_workers: usize,
}

impl Default for WorkerPoolSizes {
    fn default() -> Self {
        Self {
            loader_workers: 4,
            dispatcher_workers: 8,
            collector_workers: 2,
            trigger_workers: 2,
        }
    }
}

/// Top-level pipeline configuration. The broker and store connections
/// themselves are injected as trait objects (spec §9: "constructor
/// injected dependencies"), not constructed from a URL here — only their
/// tuning knobs are environment inputs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub senders: SenderConfigRegistry,
    pub worker_pools: WorkerPoolSizes,
    pub trigger_redelivery_delay: Duration,
    pub trigger_max_redeliveries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            senders: SenderConfigRegistry::with_defaults(),
            worker_pools: WorkerPoolSizes::default(),
            trigger_redelivery_delay: Duration::from_millis(1000),
            trigger_max_redeliveries: 10,
        }
    }
}

impl PipelineConfig {
    /// Load overrides from the process environment, falling back to
    /// [`PipelineConfig::default`] for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.trigger_redelivery_delay = Duration::from_millis(EnvUtils::get_parsed_var(
            "TRIGGER_REDELIVERY_DELAY_MS",
            config.trigger_redelivery_delay.as_millis() as u64,
        )?);
        config.trigger_max_redeliveries = EnvUtils::get_parsed_var(
            "TRIGGER_MAX_REDELIVERIES",
            config.trigger_max_redeliveries,
        )?;
        config.worker_pools.loader_workers =
            EnvUtils::get_parsed_var("LOADER_WORKERS", config.worker_pools.loader_workers)?;
        config.worker_pools.dispatcher_workers = EnvUtils::get_parsed_var(
            "DISPATCHER_WORKERS",
            config.worker_pools.dispatcher_workers,
        )?;
        Ok(config)
    }
}
