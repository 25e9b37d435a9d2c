use crate::domain::channel::MerchantId;
use crate::domain::order::{
    CreateOutcome, DispatchUpdate, NewOrder, Order, OrderIndex, UpstreamTransaction,
};
use crate::domain::ports::OrderStore;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for order records.
pub const CF_ORDERS: &str = "orders";
/// Column Family for upstream transaction records.
pub const CF_UPSTREAM_TRANSACTIONS: &str = "upstream_transactions";
/// Column Family for the merchant-scoped idempotency index.
pub const CF_ORDER_INDEX: &str = "order_index";

/// A persistent order store using RocksDB.
///
/// Each record kind has its own Column Family and every key is prefixed with
/// the partition name chosen by the table router. Creation and dispatch
/// updates are written as a single `WriteBatch`; the write lock serialises the
/// idempotency check with the batch so two writers cannot both commit.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBOrderStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBOrderStore {
    /// Opens or creates a RocksDB instance at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_ORDERS, CF_UPSTREAM_TRANSACTIONS, CF_ORDER_INDEX]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| GatewayError::Storage(format!("{name} column family not found")))
    }

    fn record_key(partition: &str, id: &str) -> Vec<u8> {
        format!("{partition}/{id}").into_bytes()
    }

    fn index_key(partition: &str, merchant_id: MerchantId, merchant_tx_ref: &str) -> Vec<u8> {
        format!("{partition}/{merchant_id}/{merchant_tx_ref}").into_bytes()
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }
}

#[async_trait]
impl OrderStore for RocksDBOrderStore {
    async fn find_index(
        &self,
        partition: &str,
        merchant_id: MerchantId,
        merchant_tx_ref: &str,
    ) -> Result<Option<OrderIndex>> {
        self.read(
            CF_ORDER_INDEX,
            &Self::index_key(partition, merchant_id, merchant_tx_ref),
        )
    }

    async fn create(&self, new: NewOrder) -> Result<CreateOutcome> {
        let _guard = self.write_lock.lock().await;
        let index_key = Self::index_key(
            &new.index_partition,
            new.index.merchant_id,
            &new.index.merchant_tx_ref,
        );
        if let Some(existing) = self.read::<OrderIndex>(CF_ORDER_INDEX, &index_key)? {
            return Ok(CreateOutcome::Duplicate(existing));
        }
        for partition in &new.earlier_index_partitions {
            let key = Self::index_key(partition, new.index.merchant_id, &new.index.merchant_tx_ref);
            if let Some(existing) = self.read::<OrderIndex>(CF_ORDER_INDEX, &key)? {
                return Ok(CreateOutcome::Duplicate(existing));
            }
        }

        let order_id = &new.order.order_id;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_ORDERS)?,
            Self::record_key(&new.order_partition, order_id),
            Self::encode(&new.order)?,
        );
        batch.put_cf(
            self.cf(CF_UPSTREAM_TRANSACTIONS)?,
            Self::record_key(&new.transaction_partition, order_id),
            Self::encode(&new.transaction)?,
        );
        batch.put_cf(self.cf(CF_ORDER_INDEX)?, index_key, Self::encode(&new.index)?);
        self.db.write(batch)?;
        Ok(CreateOutcome::Created)
    }

    async fn get_order(&self, partition: &str, order_id: &str) -> Result<Option<Order>> {
        self.read(CF_ORDERS, &Self::record_key(partition, order_id))
    }

    async fn get_upstream_transaction(
        &self,
        partition: &str,
        order_id: &str,
    ) -> Result<Option<UpstreamTransaction>> {
        self.read(
            CF_UPSTREAM_TRANSACTIONS,
            &Self::record_key(partition, order_id),
        )
    }

    async fn apply_dispatch(&self, update: DispatchUpdate) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let order_key = Self::record_key(&update.order_partition, &update.order_id);
        let tx_key = Self::record_key(&update.transaction_partition, &update.order_id);

        let missing = || {
            GatewayError::Storage(format!(
                "order {} not found in {}",
                update.order_id, update.order_partition
            ))
        };
        let mut order: Order = self.read(CF_ORDERS, &order_key)?.ok_or_else(missing)?;
        let mut tx: UpstreamTransaction = self
            .read(CF_UPSTREAM_TRANSACTIONS, &tx_key)?
            .ok_or_else(missing)?;
        order.apply(&update);
        tx.apply(&update);

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_ORDERS)?, order_key, Self::encode(&order)?);
        batch.put_cf(self.cf(CF_UPSTREAM_TRANSACTIONS)?, tx_key, Self::encode(&tx)?);
        self.db.write(batch)?;
        Ok(())
    }
}
