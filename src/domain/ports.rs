use super::channel::{
    CandidateId, ChannelCandidate, ChannelProduct, ChannelType, Merchant, MerchantChannel,
    MerchantId, MerchantRate, SupplierId, Supplier, SystemChannel,
};
use super::order::{CreateOutcome, DispatchUpdate, NewOrder, Order, OrderIndex, UpstreamTransaction};
use crate::error::{Result, UpstreamError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Read side of the channel catalog: merchants, channels, products, pricing.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn merchant_by_no(&self, merchant_no: &str) -> Result<Option<Merchant>>;
    async fn system_channel(&self, code: &str) -> Result<Option<SystemChannel>>;
    async fn merchant_channel(
        &self,
        merchant_id: MerchantId,
        channel_code: &str,
        currency: &str,
        channel_type: ChannelType,
    ) -> Result<Option<MerchantChannel>>;
    async fn products(
        &self,
        channel_code: &str,
        currency: &str,
        channel_type: ChannelType,
    ) -> Result<Vec<ChannelProduct>>;
    async fn product(&self, id: CandidateId) -> Result<Option<ChannelProduct>>;
    async fn merchant_rates(&self, merchant_id: MerchantId) -> Result<Vec<MerchantRate>>;
    async fn supplier(&self, id: SupplierId) -> Result<Option<Supplier>>;
}

/// Order, upstream transaction and index records, addressed by partition name.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_index(
        &self,
        partition: &str,
        merchant_id: MerchantId,
        merchant_tx_ref: &str,
    ) -> Result<Option<OrderIndex>>;

    /// Writes the three records atomically unless the index key exists.
    async fn create(&self, new: NewOrder) -> Result<CreateOutcome>;

    async fn get_order(&self, partition: &str, order_id: &str) -> Result<Option<Order>>;

    async fn get_upstream_transaction(
        &self,
        partition: &str,
        order_id: &str,
    ) -> Result<Option<UpstreamTransaction>>;

    async fn apply_dispatch(&self, update: DispatchUpdate) -> Result<()>;
}

/// Shared key-value cache backing the routing state.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Atomically increments `key`; the expiry is set by the first increment.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Normalized order handed to an upstream supplier.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamRequest {
    pub order_id: String,
    pub merchant_tx_ref: String,
    pub amount: Decimal,
    pub currency: String,
    pub channel_type: ChannelType,
    pub upstream_channel_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamReceipt {
    pub upstream_order_ref: String,
    /// Redirect URL or payment payload to hand back to the merchant.
    pub payload: String,
}

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Must give up once `deadline` passes and report [`UpstreamError::Timeout`].
    async fn submit(
        &self,
        candidate: &ChannelCandidate,
        request: &UpstreamRequest,
        deadline: Instant,
    ) -> std::result::Result<UpstreamReceipt, UpstreamError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Operator notification sink. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, severity: Severity, title: &str, body: &str);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderStatEvent {
    pub order_id: String,
    pub merchant_no: String,
    pub system_channel_code: String,
    pub candidate_id: CandidateId,
    pub supplier_id: SupplierId,
    pub amount: Decimal,
    pub currency: String,
    pub success: bool,
}

#[async_trait]
pub trait StatsPublisher: Send + Sync {
    async fn publish(&self, topic: &str, event: &OrderStatEvent) -> Result<()>;
}

pub type CatalogStoreRef = Arc<dyn CatalogStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type SharedCacheRef = Arc<dyn SharedCache>;
pub type UpstreamRef = Arc<dyn Upstream>;
pub type NotifierRef = Arc<dyn Notifier>;
pub type StatsPublisherRef = Arc<dyn StatsPublisher>;
