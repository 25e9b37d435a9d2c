use super::channel::{CandidateId, ChannelCandidate, ChannelType, MerchantId, SupplierId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a platform order as far as dispatch is concerned. Later
/// transitions (paid, closed, refunded) are driven by supplier callbacks.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Persisted, upstream call not finished yet.
    Pending,
    /// Accepted by an upstream supplier, waiting for its callback.
    Processing,
    /// Every candidate failed; eligible for a pinned retry.
    DispatchFailed,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::DispatchFailed => "dispatch_failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamStatus {
    Pending,
    Submitted,
    Failed,
}

/// Fee snapshot taken against the candidate an order is attributed to.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Default)]
pub struct Settlement {
    pub merchant_fee: Decimal,
    pub upstream_cost: Decimal,
    pub profit: Decimal,
    pub settle_amount: Decimal,
}

impl Settlement {
    const SCALE: u32 = 4;

    /// Rates are percentages: `2.5` means 2.5% of the amount.
    pub fn compute(amount: Decimal, candidate: &ChannelCandidate) -> Self {
        let hundred = Decimal::ONE_HUNDRED;
        let merchant_fee =
            (amount * candidate.merchant_rate / hundred + candidate.merchant_fixed).round_dp(Self::SCALE);
        let upstream_cost =
            (amount * candidate.cost_rate / hundred + candidate.cost_fixed).round_dp(Self::SCALE);
        let settle_amount = match candidate.channel_type {
            ChannelType::Collection => amount - merchant_fee,
            ChannelType::Payout => amount + merchant_fee,
        };
        Self {
            merchant_fee,
            upstream_cost,
            profit: merchant_fee - upstream_cost,
            settle_amount,
        }
    }
}

/// Which candidate an order is charged against.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Attribution {
    pub candidate_id: CandidateId,
    pub supplier_id: SupplierId,
    pub upstream_channel_code: String,
    pub settlement: Settlement,
}

impl Attribution {
    pub fn new(amount: Decimal, candidate: &ChannelCandidate) -> Self {
        Self {
            candidate_id: candidate.id,
            supplier_id: candidate.supplier_id,
            upstream_channel_code: candidate.upstream_channel_code.clone(),
            settlement: Settlement::compute(amount, candidate),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub order_id: String,
    pub merchant_id: MerchantId,
    pub merchant_no: String,
    pub merchant_tx_ref: String,
    pub amount: Decimal,
    pub currency: String,
    pub system_channel_code: String,
    pub channel_type: ChannelType,
    pub attribution: Attribution,
    pub status: OrderStatus,
    pub upstream_order_ref: Option<String>,
    pub payload: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Child record tracking the call to whichever supplier ends up serving the
/// order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct UpstreamTransaction {
    pub order_id: String,
    pub candidate_id: CandidateId,
    pub supplier_id: SupplierId,
    pub upstream_channel_code: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: UpstreamStatus,
    pub upstream_order_ref: Option<String>,
    pub attempts: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Merchant-scoped lookup record; its key is the idempotency key.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct OrderIndex {
    pub merchant_id: MerchantId,
    pub merchant_tx_ref: String,
    pub order_id: String,
    pub created_at: i64,
}

/// Everything written by the single persistence transaction of an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_partition: String,
    pub order: Order,
    pub transaction_partition: String,
    pub transaction: UpstreamTransaction,
    pub index_partition: String,
    pub index: OrderIndex,
    /// Older index partitions that must not already hold the key.
    pub earlier_index_partitions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created,
    /// The idempotency key was already taken; carries the winner's index.
    Duplicate(OrderIndex),
}

/// Result of the fallback loop, applied to the order and its upstream
/// transaction in one write.
#[derive(Debug, Clone)]
pub struct DispatchUpdate {
    pub order_partition: String,
    pub transaction_partition: String,
    pub order_id: String,
    pub status: OrderStatus,
    /// Set when the serving candidate differs from the persisted one.
    pub attribution: Option<Attribution>,
    pub upstream_order_ref: Option<String>,
    pub payload: Option<String>,
    pub failure_reason: Option<String>,
    pub attempts: u32,
    pub updated_at: i64,
}

impl Order {
    pub fn apply(&mut self, update: &DispatchUpdate) {
        self.status = update.status;
        if let Some(attribution) = &update.attribution {
            self.attribution = attribution.clone();
        }
        self.upstream_order_ref = update.upstream_order_ref.clone();
        self.payload = update.payload.clone();
        self.failure_reason = update.failure_reason.clone();
        self.updated_at = update.updated_at;
    }
}

impl UpstreamTransaction {
    pub fn apply(&mut self, update: &DispatchUpdate) {
        self.status = match update.status {
            OrderStatus::Processing => UpstreamStatus::Submitted,
            OrderStatus::DispatchFailed => UpstreamStatus::Failed,
            OrderStatus::Pending => UpstreamStatus::Pending,
        };
        if let Some(attribution) = &update.attribution {
            self.candidate_id = attribution.candidate_id;
            self.supplier_id = attribution.supplier_id;
            self.upstream_channel_code = attribution.upstream_channel_code.clone();
        }
        self.upstream_order_ref = update.upstream_order_ref.clone();
        self.attempts = update.attempts;
        self.updated_at = update.updated_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candidate(channel_type: ChannelType) -> ChannelCandidate {
        ChannelCandidate {
            id: 1,
            system_channel_code: "PIX".into(),
            upstream_channel_code: "pix_a".into(),
            supplier_id: 9,
            currency: "BRL".into(),
            channel_type,
            merchant_rate: dec!(2.5),
            merchant_fixed: dec!(1),
            cost_rate: dec!(1.2),
            cost_fixed: dec!(0.3),
            amount_range: Default::default(),
            weight: 1,
            active: true,
        }
    }

    #[test]
    fn test_collection_settlement() {
        let s = Settlement::compute(dec!(500), &candidate(ChannelType::Collection));
        assert_eq!(s.merchant_fee, dec!(13.5));
        assert_eq!(s.upstream_cost, dec!(6.3));
        assert_eq!(s.profit, dec!(7.2));
        assert_eq!(s.settle_amount, dec!(486.5));
    }

    #[test]
    fn test_payout_settlement_debits_fee_on_top() {
        let s = Settlement::compute(dec!(100), &candidate(ChannelType::Payout));
        assert_eq!(s.merchant_fee, dec!(3.5));
        assert_eq!(s.settle_amount, dec!(103.5));
    }

    #[test]
    fn test_settlement_rounds_to_four_places() {
        let s = Settlement::compute(dec!(0.333), &candidate(ChannelType::Collection));
        assert_eq!(s.merchant_fee, dec!(1.0083));
    }
}
