#![allow(dead_code)]

use async_trait::async_trait;
use paygate::application::engine::{CreateOrderRequest, GatewayEngine, GatewayPorts};
use paygate::config::GatewayConfig;
use paygate::domain::channel::{CandidateId, ChannelCandidate};
use paygate::domain::ports::{
    Notifier, OrderStatEvent, Severity, SharedCache, SharedCacheRef, StatsPublisher, Upstream,
    UpstreamReceipt, UpstreamRequest,
};
use paygate::error::{GatewayError, Result, UpstreamError};
use paygate::infrastructure::in_memory::{InMemoryCache, InMemoryCatalogStore, InMemoryOrderStore};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const MERCHANT_NO: &str = "M1";
pub const CANDIDATE_A: CandidateId = 10;
pub const CANDIDATE_B: CandidateId = 20;

/// Merchant M1 bound to PIX/BRL with two pooled candidates: A (weight 10) and
/// B (weight 5), both capped at 1000 and priced above cost.
pub fn catalog_json() -> Value {
    json!({
        "merchants": [
            {"id": 1, "merchant_no": MERCHANT_NO, "name": "Shop", "active": true},
            {"id": 2, "merchant_no": "M2", "name": "Closed", "active": false}
        ],
        "system_channels": [
            {"code": "PIX", "channel_type": "collection", "active": true},
            {"code": "BOLETO", "channel_type": "collection", "active": false}
        ],
        "merchant_channels": [
            {"merchant_id": 1, "channel_code": "PIX", "currency": "BRL", "channel_type": "collection", "active": true}
        ],
        "suppliers": [
            {"id": 100, "name": "Alpha", "active": true},
            {"id": 200, "name": "Beta", "active": true}
        ],
        "products": [
            {
                "id": CANDIDATE_A, "system_channel_code": "PIX", "upstream_channel_code": "alpha_pix",
                "supplier_id": 100, "currency": "BRL", "channel_type": "collection",
                "cost_rate": "1.0", "default_rate": "2.5", "amount_range": "1-1000",
                "weight": 10, "active": true
            },
            {
                "id": CANDIDATE_B, "system_channel_code": "PIX", "upstream_channel_code": "beta_pix",
                "supplier_id": 200, "currency": "BRL", "channel_type": "collection",
                "cost_rate": "1.2", "default_rate": "2.5", "amount_range": "1-1000",
                "weight": 5, "active": true
            }
        ],
        "merchant_rates": [
            {"merchant_id": 1, "product_id": CANDIDATE_A, "rate": "2.0", "active": true},
            {"merchant_id": 1, "product_id": CANDIDATE_B, "rate": "2.0", "fixed_fee": "0.5", "active": true}
        ]
    })
}

#[derive(Debug, Clone)]
pub enum Script {
    Accept,
    Reject(&'static str),
    Panic,
    Hang,
}

/// Upstream whose answer is scripted per candidate and which records every
/// call in order.
#[derive(Default)]
pub struct ScriptedUpstream {
    scripts: Mutex<HashMap<CandidateId, Script>>,
    calls: Mutex<Vec<CandidateId>>,
}

impl ScriptedUpstream {
    pub fn set(&self, id: CandidateId, script: Script) {
        self.scripts.lock().unwrap().insert(id, script);
    }

    pub fn calls(&self) -> Vec<CandidateId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn submit(
        &self,
        candidate: &ChannelCandidate,
        request: &UpstreamRequest,
        _deadline: Instant,
    ) -> std::result::Result<UpstreamReceipt, UpstreamError> {
        self.calls.lock().unwrap().push(candidate.id);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&candidate.id)
            .cloned()
            .unwrap_or(Script::Accept);
        match script {
            Script::Accept => Ok(UpstreamReceipt {
                upstream_order_ref: format!("up-{}-{}", candidate.id, request.order_id),
                payload: format!("https://pay.test/{}", request.order_id),
            }),
            Script::Reject(reason) => Err(UpstreamError::Rejected(reason.to_string())),
            Script::Panic => panic!("upstream adapter bug"),
            Script::Hang => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(Severity, String, String)>>,
}

impl RecordingNotifier {
    pub fn titles(&self, severity: Severity) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _, _)| *s == severity)
            .map(|(_, title, _)| title.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, severity: Severity, title: &str, body: &str) {
        self.events
            .lock()
            .unwrap()
            .push((severity, title.to_string(), body.to_string()));
    }
}

#[derive(Default)]
pub struct RecordingStats {
    pub events: Mutex<Vec<(String, OrderStatEvent)>>,
}

#[async_trait]
impl StatsPublisher for RecordingStats {
    async fn publish(&self, topic: &str, event: &OrderStatEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((topic.to_string(), event.clone()));
        Ok(())
    }
}

/// Cache that refuses every `health:` key and serves the rest from memory.
#[derive(Clone, Default)]
pub struct HealthFailingCache {
    pub inner: InMemoryCache,
}

impl HealthFailingCache {
    fn check(key: &str) -> Result<()> {
        if key.starts_with("health:") {
            return Err(GatewayError::Cache(format!("{key} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedCache for HealthFailingCache {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64> {
        Self::check(key)?;
        self.inner.incr_with_ttl(key, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Self::check(key)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        Self::check(key)?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        Self::check(key)?;
        self.inner.delete(key).await
    }
}

pub struct Harness {
    pub engine: Arc<GatewayEngine>,
    pub orders: InMemoryOrderStore,
    pub upstream: Arc<ScriptedUpstream>,
    pub notifier: Arc<RecordingNotifier>,
    pub stats: Arc<RecordingStats>,
}

pub fn harness() -> Harness {
    harness_with(catalog_json(), GatewayConfig::default())
}

pub fn harness_with(catalog: Value, config: GatewayConfig) -> Harness {
    harness_with_cache(catalog, config, Arc::new(InMemoryCache::new()))
}

pub fn harness_with_cache(catalog: Value, config: GatewayConfig, cache: SharedCacheRef) -> Harness {
    let orders = InMemoryOrderStore::new();
    let upstream = Arc::new(ScriptedUpstream::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let stats = Arc::new(RecordingStats::default());
    let ports = GatewayPorts {
        catalog: Arc::new(InMemoryCatalogStore::from_json(&catalog.to_string()).unwrap()),
        orders: Arc::new(orders.clone()),
        cache,
        upstream: upstream.clone(),
        notifier: notifier.clone(),
        stats: stats.clone(),
    };
    Harness {
        engine: Arc::new(GatewayEngine::new(ports, config)),
        orders,
        upstream,
        notifier,
        stats,
    }
}

pub fn request(tx_ref: &str, amount: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        merchant_tx_ref: tx_ref.to_string(),
        merchant_no: MERCHANT_NO.to_string(),
        amount: amount.to_string(),
        currency: "BRL".to_string(),
        system_channel_code: "PIX".to_string(),
        pinned_candidate_id: None,
    }
}
