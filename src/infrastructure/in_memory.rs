use crate::domain::channel::{
    CandidateId, ChannelProduct, ChannelType, Merchant, MerchantChannel, MerchantId, MerchantRate,
    Supplier, SupplierId, SystemChannel,
};
use crate::domain::order::{
    CreateOutcome, DispatchUpdate, NewOrder, Order, OrderIndex, UpstreamTransaction,
};
use crate::domain::ports::{CatalogStore, OrderStore, SharedCache};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// A process-local stand-in for the shared cache.
///
/// One mutex guards all entries, which makes `incr_with_ttl` atomic. Expired
/// entries are dropped lazily on access.
#[derive(Default, Clone)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedCache for InMemoryCache {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let live = entries.get(key).filter(|e| e.expires_at > now);
        let (count, expires_at) = match live {
            Some(entry) => {
                let current: i64 = entry.value.parse().map_err(|_| {
                    GatewayError::Cache(format!("value at {key} is not an integer"))
                })?;
                (current + 1, entry.expires_at)
            }
            None => (1, now + ttl),
        };
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: count.to_string(),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(key)
            && entry.expires_at > Instant::now()
        {
            return Ok(Some(entry.value.clone()));
        }
        entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

type PartitionKey = (String, String);
type IndexKey = (String, MerchantId, String);

#[derive(Default)]
struct OrderTables {
    orders: HashMap<PartitionKey, Order>,
    transactions: HashMap<PartitionKey, UpstreamTransaction>,
    index: HashMap<IndexKey, OrderIndex>,
}

/// A thread-safe in-memory order store.
///
/// The write lock spans the existence check and all three inserts, which is
/// what makes `create` atomic and at-most-once per idempotency key.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<OrderTables>>,
    writes: Arc<AtomicU64>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed write operations so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    pub async fn index_count(&self) -> usize {
        self.tables.read().await.index.len()
    }

    /// Looks an order up by id across every partition.
    pub async fn find_order(&self, order_id: &str) -> Option<Order> {
        self.tables
            .read()
            .await
            .orders
            .iter()
            .find(|((_, id), _)| id == order_id)
            .map(|(_, order)| order.clone())
    }

    pub async fn find_transaction(&self, order_id: &str) -> Option<UpstreamTransaction> {
        self.tables
            .read()
            .await
            .transactions
            .iter()
            .find(|((_, id), _)| id == order_id)
            .map(|(_, tx)| tx.clone())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_index(
        &self,
        partition: &str,
        merchant_id: MerchantId,
        merchant_tx_ref: &str,
    ) -> Result<Option<OrderIndex>> {
        let tables = self.tables.read().await;
        let key = (partition.to_string(), merchant_id, merchant_tx_ref.to_string());
        Ok(tables.index.get(&key).cloned())
    }

    async fn create(&self, new: NewOrder) -> Result<CreateOutcome> {
        let mut tables = self.tables.write().await;
        let index_key = (
            new.index_partition.clone(),
            new.index.merchant_id,
            new.index.merchant_tx_ref.clone(),
        );
        if let Some(existing) = tables.index.get(&index_key) {
            return Ok(CreateOutcome::Duplicate(existing.clone()));
        }
        for partition in &new.earlier_index_partitions {
            let key = (partition.clone(), index_key.1, index_key.2.clone());
            if let Some(existing) = tables.index.get(&key) {
                return Ok(CreateOutcome::Duplicate(existing.clone()));
            }
        }

        let order_id = new.order.order_id.clone();
        tables
            .orders
            .insert((new.order_partition, order_id.clone()), new.order);
        tables
            .transactions
            .insert((new.transaction_partition, order_id), new.transaction);
        tables.index.insert(index_key, new.index);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(CreateOutcome::Created)
    }

    async fn get_order(&self, partition: &str, order_id: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .get(&(partition.to_string(), order_id.to_string()))
            .cloned())
    }

    async fn get_upstream_transaction(
        &self,
        partition: &str,
        order_id: &str,
    ) -> Result<Option<UpstreamTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .get(&(partition.to_string(), order_id.to_string()))
            .cloned())
    }

    async fn apply_dispatch(&self, update: DispatchUpdate) -> Result<()> {
        let mut tables = self.tables.write().await;
        let order_key = (update.order_partition.clone(), update.order_id.clone());
        let tx_key = (update.transaction_partition.clone(), update.order_id.clone());
        if !tables.orders.contains_key(&order_key) || !tables.transactions.contains_key(&tx_key) {
            return Err(GatewayError::Storage(format!(
                "order {} not found in {}",
                update.order_id, update.order_partition
            )));
        }
        if let Some(order) = tables.orders.get_mut(&order_key) {
            order.apply(&update);
        }
        if let Some(tx) = tables.transactions.get_mut(&tx_key) {
            tx.apply(&update);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Catalog contents as loaded from a JSON document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogSnapshot {
    pub merchants: Vec<Merchant>,
    pub system_channels: Vec<SystemChannel>,
    pub merchant_channels: Vec<MerchantChannel>,
    pub products: Vec<ChannelProduct>,
    pub merchant_rates: Vec<MerchantRate>,
    pub suppliers: Vec<Supplier>,
}

/// Read-only catalog held in memory.
#[derive(Clone)]
pub struct InMemoryCatalogStore {
    snapshot: Arc<CatalogSnapshot>,
}

impl InMemoryCatalogStore {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn merchant_by_no(&self, merchant_no: &str) -> Result<Option<Merchant>> {
        Ok(self
            .snapshot
            .merchants
            .iter()
            .find(|m| m.merchant_no == merchant_no)
            .cloned())
    }

    async fn system_channel(&self, code: &str) -> Result<Option<SystemChannel>> {
        Ok(self
            .snapshot
            .system_channels
            .iter()
            .find(|c| c.code == code)
            .cloned())
    }

    async fn merchant_channel(
        &self,
        merchant_id: MerchantId,
        channel_code: &str,
        currency: &str,
        channel_type: ChannelType,
    ) -> Result<Option<MerchantChannel>> {
        Ok(self
            .snapshot
            .merchant_channels
            .iter()
            .find(|b| {
                b.merchant_id == merchant_id
                    && b.channel_code == channel_code
                    && b.currency == currency
                    && b.channel_type == channel_type
            })
            .cloned())
    }

    async fn products(
        &self,
        channel_code: &str,
        currency: &str,
        channel_type: ChannelType,
    ) -> Result<Vec<ChannelProduct>> {
        Ok(self
            .snapshot
            .products
            .iter()
            .filter(|p| {
                p.system_channel_code == channel_code
                    && p.currency == currency
                    && p.channel_type == channel_type
            })
            .cloned()
            .collect())
    }

    async fn product(&self, id: CandidateId) -> Result<Option<ChannelProduct>> {
        Ok(self.snapshot.products.iter().find(|p| p.id == id).cloned())
    }

    async fn merchant_rates(&self, merchant_id: MerchantId) -> Result<Vec<MerchantRate>> {
        Ok(self
            .snapshot
            .merchant_rates
            .iter()
            .filter(|r| r.merchant_id == merchant_id)
            .cloned()
            .collect())
    }

    async fn supplier(&self, id: SupplierId) -> Result<Option<Supplier>> {
        Ok(self.snapshot.suppliers.iter().find(|s| s.id == id).cloned())
    }
}
