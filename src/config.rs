use crate::error::{GatewayError, Result};
use crate::routing::health::HealthStrategy;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub strategy: HealthStrategy,
    pub disable_threshold: f64,
    pub ttl_secs: u64,
    /// Drop disabled candidates from pooled selection.
    pub filter_pooled: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            strategy: HealthStrategy::default(),
            disable_threshold: 60.0,
            ttl_secs: 30 * 60,
            filter_pooled: true,
        }
    }
}

impl HealthConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FailureConfig {
    pub window_secs: u64,
    /// Count at which a candidate's weight is halved.
    pub decay_threshold: i64,
    /// Count from which every further failure is escalated.
    pub alert_threshold: i64,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            window_secs: 5 * 60,
            decay_threshold: 3,
            alert_threshold: 10,
        }
    }
}

impl FailureConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoundRobinConfig {
    pub state_ttl_secs: u64,
}

impl Default for RoundRobinConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: 10 * 60,
        }
    }
}

/// Gateway tuning knobs. Every field has a default so an empty JSON object is
/// a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub shard_count: u32,
    pub upstream_timeout_ms: u64,
    pub health: HealthConfig,
    pub failure: FailureConfig,
    pub round_robin: RoundRobinConfig,
    pub background_queue_capacity: usize,
    pub stats_topic: String,
    pub query_lookback_months: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            shard_count: 16,
            upstream_timeout_ms: 10_000,
            health: HealthConfig::default(),
            failure: FailureConfig::default(),
            round_robin: RoundRobinConfig::default(),
            background_queue_capacity: 1024,
            stats_topic: "order.statistics".to_string(),
            query_lookback_months: 1,
        }
    }
}

impl GatewayConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(GatewayError::Config("shard_count must be positive".into()));
        }
        if self.upstream_timeout_ms == 0 {
            return Err(GatewayError::Config(
                "upstream_timeout_ms must be positive".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.health.disable_threshold) {
            return Err(GatewayError::Config(
                "health.disable_threshold must lie in [0, 100]".into(),
            ));
        }
        self.health.strategy.validate()?;
        if self.failure.decay_threshold <= 0
            || self.failure.alert_threshold < self.failure.decay_threshold
        {
            return Err(GatewayError::Config(
                "failure thresholds must satisfy 0 < decay_threshold <= alert_threshold".into(),
            ));
        }
        if self.background_queue_capacity == 0 {
            return Err(GatewayError::Config(
                "background_queue_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}
