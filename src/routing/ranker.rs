use super::failure_counter::FailureCounter;
use super::health::HealthTracker;
use super::weighted::WeightedSelector;
use crate::domain::channel::{ChannelCandidate, FailureKey};
use crate::error::{GatewayError, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Weighted rotation over every enabled candidate.
    Pooled,
    /// The caller named the candidate.
    Pinned,
}

impl DispatchMode {
    /// Pinned dispatch isolates failures per route; pooled per supplier.
    pub fn failure_key(&self, candidate: &ChannelCandidate) -> FailureKey {
        match self {
            Self::Pooled => FailureKey::supplier(candidate),
            Self::Pinned => FailureKey::route(candidate),
        }
    }
}

pub struct RankRequest<'a> {
    pub channel_code: &'a str,
    pub currency: &'a str,
    pub amount: Decimal,
    pub mode: DispatchMode,
}

/// Orders candidates for the fallback loop and enforces admission rules.
pub struct CandidateRanker {
    failures: Arc<FailureCounter>,
    health: Arc<HealthTracker>,
    selector: WeightedSelector,
    health_filter: bool,
}

impl CandidateRanker {
    pub fn new(
        failures: Arc<FailureCounter>,
        health: Arc<HealthTracker>,
        selector: WeightedSelector,
        health_filter: bool,
    ) -> Self {
        Self {
            failures,
            health,
            selector,
            health_filter,
        }
    }

    pub async fn rank(
        &self,
        mut candidates: Vec<ChannelCandidate>,
        request: &RankRequest<'_>,
    ) -> Result<Vec<ChannelCandidate>> {
        let no_channel = || GatewayError::NoChannelAvailable {
            channel_code: request.channel_code.to_string(),
            currency: request.currency.to_string(),
        };
        if candidates.is_empty() {
            return Err(no_channel());
        }

        for candidate in &mut candidates {
            self.decay_weight(candidate, request.mode).await;
        }

        let pooled = request.mode == DispatchMode::Pooled;
        if pooled {
            candidates.retain(ChannelCandidate::has_margin);
            if candidates.is_empty() {
                return Err(GatewayError::FeeBelowCost);
            }
        }

        candidates.retain(|c| c.amount_range.contains(request.amount));
        if candidates.is_empty() {
            return Err(GatewayError::AmountOutOfRange(request.amount));
        }

        if pooled && self.health_filter {
            let mut healthy = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                if !self.is_disabled(&candidate).await {
                    healthy.push(candidate);
                }
            }
            candidates = healthy;
            if candidates.is_empty() {
                return Err(no_channel());
            }
        }

        if pooled {
            self.order_pooled(&mut candidates, request).await;
        }
        debug!(
            channel_code = request.channel_code,
            currency = request.currency,
            ranked = ?candidates.iter().map(|c| c.id).collect::<Vec<_>>(),
            "Ranked candidates"
        );
        Ok(candidates)
    }

    async fn decay_weight(&self, candidate: &mut ChannelCandidate, mode: DispatchMode) {
        let key = mode.failure_key(candidate);
        let count = match self.failures.count(&key).await {
            Ok(count) => count,
            Err(e) => {
                warn!(failure_key = %key, error = %e, "Failure tally unavailable, weight kept");
                return;
            }
        };
        if count >= self.failures.decay_threshold() && candidate.weight > 0 {
            candidate.weight = (candidate.weight / 2).max(1);
            debug!(
                candidate_id = candidate.id,
                failures = count,
                weight = candidate.weight,
                "Weight decayed"
            );
        }
    }

    async fn is_disabled(&self, candidate: &ChannelCandidate) -> bool {
        self.health
            .is_disabled(candidate.id)
            .await
            .unwrap_or_else(|e| {
                warn!(candidate_id = candidate.id, error = %e, "Health state unavailable");
                false
            })
    }

    /// Rotation pick first, the rest by weight descending then id.
    async fn order_pooled(&self, candidates: &mut [ChannelCandidate], request: &RankRequest<'_>) {
        candidates.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.id.cmp(&b.id)));

        let weights: Vec<_> = candidates.iter().map(|c| (c.id, c.weight)).collect();
        let state_key = WeightedSelector::state_key(request.channel_code, request.currency);
        let picked = match self.selector.pick(&state_key, &weights).await {
            Ok(picked) => picked,
            Err(e) => {
                warn!(state_key = %state_key, error = %e, "Round-robin state unavailable, using weight order");
                None
            }
        };
        if let Some(pos) = picked.and_then(|id| candidates.iter().position(|c| c.id == id)) {
            candidates[..=pos].rotate_right(1);
        }
    }
}
