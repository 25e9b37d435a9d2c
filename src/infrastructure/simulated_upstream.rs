use crate::domain::channel::{ChannelCandidate, SupplierId};
use crate::domain::ports::{Upstream, UpstreamReceipt, UpstreamRequest};
use crate::error::UpstreamError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Scripted behaviour of one supplier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SupplierBehavior {
    Accept,
    Reject { reason: String },
    Delay { millis: u64 },
}

/// Upstream collaborator that answers from a per-supplier script instead of
/// calling a real payment provider. Suppliers without a script accept.
#[derive(Debug, Clone, Default)]
pub struct SimulatedUpstream {
    behaviors: HashMap<SupplierId, SupplierBehavior>,
}

impl SimulatedUpstream {
    pub fn new(behaviors: HashMap<SupplierId, SupplierBehavior>) -> Self {
        Self { behaviors }
    }

    /// Reads the optional `upstreams` object of a catalog document:
    /// `{"upstreams": {"100": {"mode": "reject", "reason": "..."}}}`.
    pub fn from_catalog_json(raw: &str) -> serde_json::Result<Self> {
        #[derive(Deserialize)]
        struct Doc {
            #[serde(default)]
            upstreams: HashMap<SupplierId, SupplierBehavior>,
        }
        let doc: Doc = serde_json::from_str(raw)?;
        Ok(Self::new(doc.upstreams))
    }

    fn receipt(candidate: &ChannelCandidate, request: &UpstreamRequest) -> UpstreamReceipt {
        UpstreamReceipt {
            upstream_order_ref: format!("{}-{}", candidate.supplier_id, request.order_id),
            payload: format!(
                "https://pay.example/{}/{}",
                candidate.upstream_channel_code, request.order_id
            ),
        }
    }
}

#[async_trait]
impl Upstream for SimulatedUpstream {
    async fn submit(
        &self,
        candidate: &ChannelCandidate,
        request: &UpstreamRequest,
        deadline: Instant,
    ) -> Result<UpstreamReceipt, UpstreamError> {
        let behavior = self
            .behaviors
            .get(&candidate.supplier_id)
            .cloned()
            .unwrap_or(SupplierBehavior::Accept);
        debug!(supplier_id = candidate.supplier_id, ?behavior, "Simulated upstream call");

        match behavior {
            SupplierBehavior::Accept => Ok(Self::receipt(candidate, request)),
            SupplierBehavior::Reject { reason } => Err(UpstreamError::Rejected(reason)),
            SupplierBehavior::Delay { millis } => {
                let started = Instant::now();
                let ready_at = started + Duration::from_millis(millis);
                if ready_at > deadline {
                    tokio::time::sleep_until(deadline).await;
                    return Err(UpstreamError::Timeout(started.elapsed().as_millis() as u64));
                }
                tokio::time::sleep_until(ready_at).await;
                Ok(Self::receipt(candidate, request))
            }
        }
    }
}
