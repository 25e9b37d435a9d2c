use crate::config::HealthConfig;
use crate::domain::channel::CandidateId;
use crate::domain::ports::SharedCacheRef;
use crate::error::{GatewayError, Result};
use serde::Deserialize;
use tracing::{debug, warn};

pub const MAX_SCORE: f64 = 100.0;

/// How a candidate's score reacts to one attempt outcome.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthStrategy {
    /// Failures multiply the score by `factor`; successes leave it alone.
    Decay { factor: f64 },
    /// Exponentially weighted average of outcomes mapped to 0 or 100.
    Ewma { alpha: f64 },
    /// Moves the score by a fixed `step` up or down.
    SlidingWindow { step: f64 },
}

impl Default for HealthStrategy {
    fn default() -> Self {
        Self::Decay { factor: 0.95 }
    }
}

impl HealthStrategy {
    pub fn update(&self, current: f64, success: bool) -> f64 {
        let next = match *self {
            Self::Decay { factor } => {
                if success {
                    current
                } else {
                    current * factor
                }
            }
            Self::Ewma { alpha } => {
                let sample = if success { MAX_SCORE } else { 0.0 };
                alpha * sample + (1.0 - alpha) * current
            }
            Self::SlidingWindow { step } => {
                if success {
                    current + step
                } else {
                    current - step
                }
            }
        };
        next.clamp(0.0, MAX_SCORE)
    }

    pub fn validate(&self) -> Result<()> {
        let ok = match *self {
            Self::Decay { factor } => factor > 0.0 && factor <= 1.0,
            Self::Ewma { alpha } => alpha > 0.0 && alpha <= 1.0,
            Self::SlidingWindow { step } => step > 0.0 && step <= MAX_SCORE,
        };
        if ok {
            Ok(())
        } else {
            Err(GatewayError::Config(format!(
                "invalid health strategy parameters: {self:?}"
            )))
        }
    }
}

/// Longer-lived success-rate circuit breaker per candidate.
///
/// Scores live in the shared cache with a TTL, so a disabled candidate comes
/// back once its marker expires.
pub struct HealthTracker {
    cache: SharedCacheRef,
    config: HealthConfig,
}

impl HealthTracker {
    pub fn new(cache: SharedCacheRef, config: HealthConfig) -> Self {
        Self { cache, config }
    }

    fn score_key(id: CandidateId) -> String {
        format!("health:score:{id}")
    }

    fn disabled_key(id: CandidateId) -> String {
        format!("health:disabled:{id}")
    }

    pub async fn score(&self, id: CandidateId) -> Result<f64> {
        let raw = self.cache.get(&Self::score_key(id)).await?;
        Ok(raw
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(MAX_SCORE))
    }

    /// Records one attempt outcome and returns the new score.
    pub async fn update(&self, id: CandidateId, success: bool) -> Result<f64> {
        let current = self.score(id).await?;
        let next = self.config.strategy.update(current, success);
        let ttl = self.config.ttl();
        self.cache
            .set(&Self::score_key(id), &next.to_string(), ttl)
            .await?;

        if next < self.config.disable_threshold {
            self.cache.set(&Self::disabled_key(id), "1", ttl).await?;
            warn!(candidate_id = id, score = next, "Candidate disabled by health score");
        } else {
            debug!(candidate_id = id, score = next, "Candidate health updated");
        }
        Ok(next)
    }

    pub async fn is_disabled(&self, id: CandidateId) -> Result<bool> {
        Ok(self.cache.get(&Self::disabled_key(id)).await?.is_some())
    }
}
