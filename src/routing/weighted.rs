use crate::domain::channel::CandidateId;
use crate::domain::ports::SharedCacheRef;
use crate::error::Result;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

pub type Credits = HashMap<CandidateId, i64>;

/// One step of smooth weighted round robin over `weights`.
///
/// Every positive-weight id earns its weight in credit, the richest id wins
/// and pays back the total. Ties go to the heavier id, then the lower id.
/// Credits of ids absent from `weights` are left untouched, so requests that
/// admit different subsets of a channel's candidates share one rotation
/// without resetting each other.
pub fn smooth_pick(credits: &mut Credits, weights: &[(CandidateId, u32)]) -> Option<CandidateId> {
    let eligible: Vec<(CandidateId, i64)> = weights
        .iter()
        .filter(|(_, w)| *w > 0)
        .map(|&(id, w)| (id, i64::from(w)))
        .collect();
    if eligible.is_empty() {
        return None;
    }

    let total: i64 = eligible.iter().map(|(_, w)| w).sum();
    for &(id, weight) in &eligible {
        *credits.entry(id).or_insert(0) += weight;
    }

    let (winner, _) = eligible
        .iter()
        .max_by_key(|&&(id, weight)| (credits[&id], weight, Reverse(id)))
        .copied()?;
    if let Some(credit) = credits.get_mut(&winner) {
        *credit -= total;
    }
    Some(winner)
}

/// Smooth weighted round robin whose credit map lives in the shared cache,
/// keyed per (system channel, currency), so every gateway instance continues
/// the same rotation.
///
/// Read-modify-write is not serialised across callers; a lost update only
/// skews fairness briefly.
pub struct WeightedSelector {
    cache: SharedCacheRef,
    state_ttl: Duration,
}

impl WeightedSelector {
    pub fn new(cache: SharedCacheRef, state_ttl: Duration) -> Self {
        Self { cache, state_ttl }
    }

    pub fn state_key(channel_code: &str, currency: &str) -> String {
        format!("rr:{channel_code}:{currency}")
    }

    pub async fn pick(
        &self,
        state_key: &str,
        weights: &[(CandidateId, u32)],
    ) -> Result<Option<CandidateId>> {
        let mut credits: Credits = match self.cache.get(state_key).await? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(state_key, error = %e, "Discarding unreadable round-robin state");
                Credits::new()
            }),
            None => Credits::new(),
        };

        let picked = smooth_pick(&mut credits, weights);
        if picked.is_some() {
            let encoded = serde_json::to_string(&credits)?;
            self.cache.set(state_key, &encoded, self.state_ttl).await?;
        }
        debug!(state_key, picked = ?picked, "Weighted selection");
        Ok(picked)
    }
}
