use super::background::BackgroundQueue;
use crate::config::GatewayConfig;
use crate::domain::channel::{CandidateId, ChannelCandidate, Merchant, MerchantId, SystemChannel};
use crate::domain::money::Amount;
use crate::domain::order::{
    Attribution, CreateOutcome, DispatchUpdate, NewOrder, Order, OrderIndex, OrderStatus,
    UpstreamStatus, UpstreamTransaction,
};
use crate::domain::ports::{
    CatalogStoreRef, NotifierRef, OrderStatEvent, OrderStoreRef, Severity, SharedCacheRef,
    StatsPublisherRef, UpstreamReceipt, UpstreamRef, UpstreamRequest,
};
use crate::error::{GatewayError, Result, UpstreamError};
use crate::routing::catalog::CatalogResolver;
use crate::routing::failure_counter::FailureCounter;
use crate::routing::health::HealthTracker;
use crate::routing::ranker::{CandidateRanker, DispatchMode, RankRequest};
use crate::routing::table_router::TableRouter;
use crate::routing::weighted::WeightedSelector;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use rust_decimal::Decimal;
use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

pub const ORDERS_TABLE: &str = "orders";
pub const UPSTREAM_TRANSACTIONS_TABLE: &str = "upstream_transactions";
pub const ORDER_INDEX_TABLE: &str = "order_index";

/// The collaborators the engine is wired to.
#[derive(Clone)]
pub struct GatewayPorts {
    pub catalog: CatalogStoreRef,
    pub orders: OrderStoreRef,
    pub cache: SharedCacheRef,
    pub upstream: UpstreamRef,
    pub notifier: NotifierRef,
    pub stats: StatsPublisherRef,
}

/// A merchant's order submission, as received.
#[derive(Debug, Clone, Default)]
pub struct CreateOrderRequest {
    pub merchant_tx_ref: String,
    pub merchant_no: String,
    pub amount: String,
    pub currency: String,
    pub system_channel_code: String,
    pub pinned_candidate_id: Option<CandidateId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOrderResponse {
    pub platform_order_id: String,
    /// Redirect URL or payment payload from the serving supplier.
    pub payload: Option<String>,
    pub status: OrderStatus,
    pub candidate_id: CandidateId,
    /// True when the request replayed an existing idempotency key.
    pub duplicate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderView {
    pub platform_order_id: String,
    pub status: OrderStatus,
    pub amount: Decimal,
    pub currency: String,
}

struct ValidRequest {
    merchant_tx_ref: String,
    merchant_no: String,
    amount: Amount,
    currency: String,
    channel_code: String,
    pinned: Option<CandidateId>,
}

/// Where the records of one freshly persisted order live.
struct Persisted {
    order: Order,
    order_partition: String,
    transaction_partition: String,
}

/// Dispatch orchestrator: validates and resolves a request, ranks candidates,
/// persists the order exactly once per idempotency key and walks the ranked
/// list until one supplier accepts.
///
/// Attempt bookkeeping, notifications and statistics run on a background
/// queue and never delay the response.
pub struct GatewayEngine {
    config: GatewayConfig,
    router: TableRouter,
    resolver: CatalogResolver,
    ranker: CandidateRanker,
    health: Arc<HealthTracker>,
    failures: Arc<FailureCounter>,
    orders: OrderStoreRef,
    upstream: UpstreamRef,
    notifier: NotifierRef,
    stats: StatsPublisherRef,
    background: BackgroundQueue,
}

impl GatewayEngine {
    /// Creates the engine and starts its background worker; must run inside a
    /// tokio runtime.
    pub fn new(ports: GatewayPorts, config: GatewayConfig) -> Self {
        let health = Arc::new(HealthTracker::new(ports.cache.clone(), config.health.clone()));
        let failures = Arc::new(FailureCounter::new(
            ports.cache.clone(),
            ports.notifier.clone(),
            config.failure.clone(),
        ));
        let selector = WeightedSelector::new(
            ports.cache.clone(),
            std::time::Duration::from_secs(config.round_robin.state_ttl_secs),
        );
        let ranker = CandidateRanker::new(
            failures.clone(),
            health.clone(),
            selector,
            config.health.filter_pooled,
        );
        let (background, _worker) = BackgroundQueue::spawn(config.background_queue_capacity);

        Self {
            router: TableRouter::new(config.shard_count),
            resolver: CatalogResolver::new(ports.catalog),
            ranker,
            health,
            failures,
            orders: ports.orders,
            upstream: ports.upstream,
            notifier: ports.notifier,
            stats: ports.stats,
            background,
            config,
        }
    }

    pub fn router(&self) -> &TableRouter {
        &self.router
    }

    /// Waits for all background work queued so far.
    pub async fn flush_background(&self) {
        self.background.flush().await;
    }

    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<CreateOrderResponse> {
        let span = info_span!(
            "create_order",
            merchant_no = %request.merchant_no,
            merchant_tx_ref = %request.merchant_tx_ref,
        );
        let context = format!(
            "merchant_no={} merchant_tx_ref={} amount={} currency={} channel={} pinned={:?}",
            request.merchant_no,
            request.merchant_tx_ref,
            request.amount,
            request.currency,
            request.system_channel_code,
            request.pinned_candidate_id
        );
        self.contained("create_order", context, self.dispatch(request).instrument(span))
            .await
    }

    pub async fn query_order(&self, merchant_tx_ref: &str, merchant_no: &str) -> Result<OrderView> {
        let span = info_span!("query_order", merchant_no, merchant_tx_ref);
        let context = format!("merchant_no={merchant_no} merchant_tx_ref={merchant_tx_ref}");
        self.contained(
            "query_order",
            context,
            self.lookup(merchant_tx_ref, merchant_no).instrument(span),
        )
        .await
    }

    /// Converts a panic inside `fut` into an internal error plus a critical
    /// notification.
    async fn contained<T, F>(&self, operation: &'static str, context: String, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                let backtrace = Backtrace::force_capture();
                error!(operation, %message, %context, "Recovered from panic");
                self.notify(
                    Severity::Critical,
                    "Unexpected fault",
                    format!("{operation} panicked: {message}\n{context}\n{backtrace}"),
                );
                Err(GatewayError::Internal(format!("{operation} failed unexpectedly")))
            }
        }
    }

    async fn dispatch(&self, request: CreateOrderRequest) -> Result<CreateOrderResponse> {
        let request = validate(request)?;

        let merchant = self.resolver.merchant(&request.merchant_no).await?;
        let channel = self.resolver.system_channel(&request.channel_code).await?;
        self.resolver
            .binding(&merchant, &channel, &request.currency)
            .await?;

        let (mode, candidates) = match request.pinned {
            Some(id) => {
                let candidate = self
                    .resolver
                    .pinned(&merchant, &channel, &request.currency, id)
                    .await?;
                (DispatchMode::Pinned, vec![candidate])
            }
            None => {
                let pooled = self
                    .resolver
                    .pooled(&merchant, &channel, &request.currency)
                    .await?;
                (DispatchMode::Pooled, pooled)
            }
        };
        let ranked = self
            .ranker
            .rank(
                candidates,
                &RankRequest {
                    channel_code: &channel.code,
                    currency: &request.currency,
                    amount: request.amount.value(),
                    mode,
                },
            )
            .await?;

        let now = Utc::now();
        let partitions = self.index_partitions(merchant.id, now.timestamp());
        if let Some(existing) = self
            .find_existing(&partitions, merchant.id, &request.merchant_tx_ref)
            .await?
        {
            info!(order_id = %existing.order_id, "Duplicate submission short-circuited");
            return self.replay(existing).await;
        }

        let persisted = match self
            .persist(&request, &merchant, &channel, &ranked[0], partitions, now)
            .await?
        {
            Ok(persisted) => persisted,
            Err(existing) => {
                info!(order_id = %existing.order_id, "Concurrent duplicate lost the race");
                return self.replay(existing).await;
            }
        };
        info!(
            order_id = %persisted.order.order_id,
            candidates = ranked.len(),
            "Order persisted"
        );

        self.call_upstreams(persisted, &ranked, mode).await
    }

    /// Commits order, upstream transaction and index in one step. The inner
    /// `Err` carries the winning index when another writer got there first.
    async fn persist(
        &self,
        request: &ValidRequest,
        merchant: &Merchant,
        channel: &SystemChannel,
        first: &ChannelCandidate,
        index_partitions: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<std::result::Result<Persisted, OrderIndex>> {
        let (index_partition, earlier_index_partitions) = index_partitions
            .split_first()
            .map(|(current, earlier)| (current.clone(), earlier.to_vec()))
            .ok_or_else(|| GatewayError::Internal("no index partition for order".into()))?;
        let created_at = now.timestamp();
        let order_id = new_order_id(now);
        let amount = request.amount.value();
        let order_partition = self.router.route(ORDERS_TABLE, &order_id, created_at);
        let transaction_partition =
            self.router
                .route(UPSTREAM_TRANSACTIONS_TABLE, &order_id, created_at);

        let order = Order {
            order_id: order_id.clone(),
            merchant_id: merchant.id,
            merchant_no: merchant.merchant_no.clone(),
            merchant_tx_ref: request.merchant_tx_ref.clone(),
            amount,
            currency: request.currency.clone(),
            system_channel_code: channel.code.clone(),
            channel_type: channel.channel_type,
            attribution: Attribution::new(amount, first),
            status: OrderStatus::Pending,
            upstream_order_ref: None,
            payload: None,
            failure_reason: None,
            created_at,
            updated_at: created_at,
        };
        let transaction = UpstreamTransaction {
            order_id: order_id.clone(),
            candidate_id: first.id,
            supplier_id: first.supplier_id,
            upstream_channel_code: first.upstream_channel_code.clone(),
            amount,
            currency: request.currency.clone(),
            status: UpstreamStatus::Pending,
            upstream_order_ref: None,
            attempts: 0,
            created_at,
            updated_at: created_at,
        };
        let index = OrderIndex {
            merchant_id: merchant.id,
            merchant_tx_ref: request.merchant_tx_ref.clone(),
            order_id,
            created_at,
        };

        let outcome = self
            .orders
            .create(NewOrder {
                order_partition: order_partition.clone(),
                order: order.clone(),
                transaction_partition: transaction_partition.clone(),
                transaction,
                index_partition,
                index,
                earlier_index_partitions,
            })
            .await
            .inspect_err(|e| error!(error = %e, "Order persistence failed"))?;

        Ok(match outcome {
            CreateOutcome::Created => Ok(Persisted {
                order,
                order_partition,
                transaction_partition,
            }),
            CreateOutcome::Duplicate(existing) => Err(existing),
        })
    }

    /// Walks the ranked list, one candidate at a time, until one accepts.
    async fn call_upstreams(
        &self,
        persisted: Persisted,
        ranked: &[ChannelCandidate],
        mode: DispatchMode,
    ) -> Result<CreateOrderResponse> {
        let order = &persisted.order;
        let request = UpstreamRequest {
            order_id: order.order_id.clone(),
            merchant_tx_ref: order.merchant_tx_ref.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            channel_type: order.channel_type,
            upstream_channel_code: String::new(),
        };
        let timeout = self.config.upstream_timeout();

        let mut last_failure: Option<(CandidateId, UpstreamError)> = None;
        for (attempt, candidate) in ranked.iter().enumerate() {
            let request = UpstreamRequest {
                upstream_channel_code: candidate.upstream_channel_code.clone(),
                ..request.clone()
            };
            let deadline = Instant::now() + timeout;
            let result = tokio::time::timeout_at(
                deadline,
                self.upstream.submit(candidate, &request, deadline),
            )
            .await
            .unwrap_or(Err(UpstreamError::Timeout(self.config.upstream_timeout_ms)));

            match result {
                Ok(receipt) => {
                    self.record_attempt(candidate, mode, true);
                    let attempts = attempt as u32 + 1;
                    return self
                        .complete(&persisted, candidate, receipt, attempts)
                        .await;
                }
                Err(e) => {
                    warn!(
                        order_id = %order.order_id,
                        candidate_id = candidate.id,
                        supplier_id = candidate.supplier_id,
                        attempt = attempt + 1,
                        error = %e,
                        "Upstream call failed"
                    );
                    self.record_attempt(candidate, mode, false);
                    self.notify(
                        Severity::Warning,
                        "Upstream call failed",
                        format!(
                            "order={} merchant_no={} merchant_tx_ref={} amount={} {} channel={} \
                             candidate={} supplier={} upstream_channel={} attempt={}/{} error={}",
                            order.order_id,
                            order.merchant_no,
                            order.merchant_tx_ref,
                            order.amount,
                            order.currency,
                            order.system_channel_code,
                            candidate.id,
                            candidate.supplier_id,
                            candidate.upstream_channel_code,
                            attempt + 1,
                            ranked.len(),
                            e
                        ),
                    );
                    last_failure = Some((candidate.id, e));
                }
            }
        }

        let (candidate_id, source) = last_failure.ok_or_else(|| {
            GatewayError::Internal("fallback loop ran without candidates".into())
        })?;
        self.exhausted(&persisted, ranked, candidate_id, &source).await;
        Err(GatewayError::Upstream {
            candidate_id,
            source,
        })
    }

    async fn complete(
        &self,
        persisted: &Persisted,
        candidate: &ChannelCandidate,
        receipt: UpstreamReceipt,
        attempts: u32,
    ) -> Result<CreateOrderResponse> {
        let order = &persisted.order;
        // Settlement was computed against the first candidate; re-attribute
        // when a fallback served the order.
        let attribution = (candidate.id != order.attribution.candidate_id)
            .then(|| Attribution::new(order.amount, candidate));

        self.orders
            .apply_dispatch(DispatchUpdate {
                order_partition: persisted.order_partition.clone(),
                transaction_partition: persisted.transaction_partition.clone(),
                order_id: order.order_id.clone(),
                status: OrderStatus::Processing,
                attribution,
                upstream_order_ref: Some(receipt.upstream_order_ref),
                payload: Some(receipt.payload.clone()),
                failure_reason: None,
                attempts,
                updated_at: Utc::now().timestamp(),
            })
            .await
            .inspect_err(|e| error!(order_id = %order.order_id, error = %e, "Dispatch update failed"))?;

        info!(
            order_id = %order.order_id,
            candidate_id = candidate.id,
            supplier_id = candidate.supplier_id,
            attempts,
            "Order dispatched"
        );
        self.publish_stats(order, candidate, true);

        Ok(CreateOrderResponse {
            platform_order_id: order.order_id.clone(),
            payload: Some(receipt.payload),
            status: OrderStatus::Processing,
            candidate_id: candidate.id,
            duplicate: false,
        })
    }

    async fn exhausted(
        &self,
        persisted: &Persisted,
        ranked: &[ChannelCandidate],
        candidate_id: CandidateId,
        source: &UpstreamError,
    ) {
        let order = &persisted.order;
        let update = DispatchUpdate {
            order_partition: persisted.order_partition.clone(),
            transaction_partition: persisted.transaction_partition.clone(),
            order_id: order.order_id.clone(),
            status: OrderStatus::DispatchFailed,
            attribution: None,
            upstream_order_ref: None,
            payload: None,
            failure_reason: Some(format!("candidate {candidate_id}: {source}")),
            attempts: ranked.len() as u32,
            updated_at: Utc::now().timestamp(),
        };
        if let Err(e) = self.orders.apply_dispatch(update).await {
            error!(order_id = %order.order_id, error = %e, "Could not mark order as failed");
        }

        warn!(order_id = %order.order_id, attempts = ranked.len(), "All candidates failed");
        self.notify(
            Severity::Critical,
            "Order dispatch exhausted",
            format!(
                "order={} merchant_no={} merchant_tx_ref={} amount={} {} channel={} tried={:?} last_error={}",
                order.order_id,
                order.merchant_no,
                order.merchant_tx_ref,
                order.amount,
                order.currency,
                order.system_channel_code,
                ranked.iter().map(|c| c.id).collect::<Vec<_>>(),
                source
            ),
        );
        if let Some(last) = ranked.iter().find(|c| c.id == candidate_id) {
            self.publish_stats(order, last, false);
        }
    }

    async fn replay(&self, index: OrderIndex) -> Result<CreateOrderResponse> {
        let order = self.load_order(&index).await?;
        Ok(CreateOrderResponse {
            platform_order_id: order.order_id,
            payload: order.payload,
            status: order.status,
            candidate_id: order.attribution.candidate_id,
            duplicate: true,
        })
    }

    async fn load_order(&self, index: &OrderIndex) -> Result<Order> {
        let partition = self
            .router
            .route(ORDERS_TABLE, &index.order_id, index.created_at);
        self.orders
            .get_order(&partition, &index.order_id)
            .await?
            .ok_or_else(|| {
                GatewayError::Storage(format!(
                    "index points to missing order {} in {}",
                    index.order_id, partition
                ))
            })
    }

    async fn lookup(&self, merchant_tx_ref: &str, merchant_no: &str) -> Result<OrderView> {
        let merchant_tx_ref = merchant_tx_ref.trim();
        let merchant_no = merchant_no.trim();
        if merchant_tx_ref.is_empty() {
            return Err(GatewayError::MissingField("merchant_tx_ref"));
        }
        if merchant_no.is_empty() {
            return Err(GatewayError::MissingField("merchant_no"));
        }
        let merchant = self
            .resolver
            .find_merchant(merchant_no)
            .await?
            .ok_or_else(|| GatewayError::MerchantNotFound(merchant_no.to_string()))?;

        let partitions = self.index_partitions(merchant.id, Utc::now().timestamp());
        let index = self
            .find_existing(&partitions, merchant.id, merchant_tx_ref)
            .await?
            .ok_or_else(|| GatewayError::OrderNotFound(merchant_tx_ref.to_string()))?;
        let order = self.load_order(&index).await?;
        Ok(OrderView {
            platform_order_id: order.order_id,
            status: order.status,
            amount: order.amount,
            currency: order.currency,
        })
    }

    /// Index partitions of a merchant, current month first, reaching back
    /// `query_lookback_months`.
    fn index_partitions(&self, merchant_id: MerchantId, timestamp: i64) -> Vec<String> {
        self.router.route_recent(
            ORDER_INDEX_TABLE,
            &merchant_id.to_string(),
            timestamp,
            self.config.query_lookback_months,
        )
    }

    async fn find_existing(
        &self,
        partitions: &[String],
        merchant_id: MerchantId,
        merchant_tx_ref: &str,
    ) -> Result<Option<OrderIndex>> {
        for partition in partitions {
            if let Some(index) = self
                .orders
                .find_index(partition, merchant_id, merchant_tx_ref)
                .await?
            {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Queues health and failure-tally bookkeeping for one attempt.
    fn record_attempt(&self, candidate: &ChannelCandidate, mode: DispatchMode, success: bool) {
        let health = self.health.clone();
        let failures = self.failures.clone();
        let candidate_id = candidate.id;
        let key = mode.failure_key(candidate);
        self.background.submit("record_attempt", async move {
            let health_result = health
                .update(candidate_id, success)
                .await
                .inspect_err(|e| warn!(candidate_id, error = %e, "Health update failed"));
            let tally_result = if success {
                failures.clear(&key).await
            } else {
                failures.record_failure(&key).await.map(|_| ())
            }
            .inspect_err(|e| warn!(candidate_id, error = %e, "Failure tally update failed"));
            health_result.map(|_| ()).and(tally_result)
        });
    }

    fn notify(&self, severity: Severity, title: &'static str, body: String) {
        let notifier = self.notifier.clone();
        self.background.submit("notify", async move {
            notifier.notify(severity, title, &body);
            Ok(())
        });
    }

    fn publish_stats(&self, order: &Order, candidate: &ChannelCandidate, success: bool) {
        let stats = self.stats.clone();
        let topic = self.config.stats_topic.clone();
        let event = OrderStatEvent {
            order_id: order.order_id.clone(),
            merchant_no: order.merchant_no.clone(),
            system_channel_code: order.system_channel_code.clone(),
            candidate_id: candidate.id,
            supplier_id: candidate.supplier_id,
            amount: order.amount,
            currency: order.currency.clone(),
            success,
        };
        self.background.submit("publish_stats", async move {
            stats.publish(&topic, &event).await
        });
    }
}

fn validate(request: CreateOrderRequest) -> Result<ValidRequest> {
    let required = |value: String, field: &'static str| {
        let value = value.trim().to_string();
        if value.is_empty() {
            Err(GatewayError::MissingField(field))
        } else {
            Ok(value)
        }
    };
    Ok(ValidRequest {
        merchant_tx_ref: required(request.merchant_tx_ref, "merchant_tx_ref")?,
        merchant_no: required(request.merchant_no, "merchant_no")?,
        amount: Amount::parse(&request.amount)?,
        currency: required(request.currency, "currency")?.to_ascii_uppercase(),
        channel_code: required(request.system_channel_code, "system_channel_code")?,
        pinned: request.pinned_candidate_id,
    })
}

/// Timestamp prefix plus random suffix; unique without coordination.
fn new_order_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("P{}{}", now.format("%Y%m%d%H%M%S"), &suffix[..12]).to_uppercase()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
