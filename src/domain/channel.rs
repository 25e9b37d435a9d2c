use super::money::AmountRange;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type MerchantId = u64;
pub type SupplierId = u64;
/// Identifier of an upstream channel product, i.e. one routable candidate.
pub type CandidateId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Collection,
    Payout,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection => f.write_str("collection"),
            Self::Payout => f.write_str("payout"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Merchant {
    pub id: MerchantId,
    pub merchant_no: String,
    #[serde(default)]
    pub name: String,
    pub active: bool,
}

/// A payment method as the platform exposes it to merchants, e.g. `PIX`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SystemChannel {
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub channel_type: ChannelType,
    pub active: bool,
}

/// Binding that allows a merchant to use a system channel in a currency.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct MerchantChannel {
    pub merchant_id: MerchantId,
    pub channel_code: String,
    pub currency: String,
    pub channel_type: ChannelType,
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Supplier {
    pub id: SupplierId,
    #[serde(default)]
    pub name: String,
    pub active: bool,
}

/// An upstream channel product: one supplier's implementation of a system
/// channel, with the platform's cost and default merchant pricing.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ChannelProduct {
    pub id: CandidateId,
    pub system_channel_code: String,
    pub upstream_channel_code: String,
    pub supplier_id: SupplierId,
    pub currency: String,
    pub channel_type: ChannelType,
    /// Upstream cost rate in percent.
    pub cost_rate: Decimal,
    #[serde(default)]
    pub cost_fixed: Decimal,
    /// Merchant rate in percent used when the merchant has no override.
    pub default_rate: Decimal,
    #[serde(default)]
    pub default_fixed: Decimal,
    #[serde(default)]
    pub amount_range: AmountRange,
    pub weight: u32,
    pub active: bool,
}

/// Per-merchant enablement and pricing of a channel product.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct MerchantRate {
    pub merchant_id: MerchantId,
    pub product_id: CandidateId,
    #[serde(default)]
    pub rate: Option<Decimal>,
    #[serde(default)]
    pub fixed_fee: Option<Decimal>,
    pub active: bool,
}

/// One eligible route for an order, with the merchant's effective pricing
/// already applied.
///
/// `weight` is a selection-time artifact: the ranker may decay it, and the
/// change is never written back to the catalog.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ChannelCandidate {
    pub id: CandidateId,
    pub system_channel_code: String,
    pub upstream_channel_code: String,
    pub supplier_id: SupplierId,
    pub currency: String,
    pub channel_type: ChannelType,
    pub merchant_rate: Decimal,
    pub merchant_fixed: Decimal,
    pub cost_rate: Decimal,
    pub cost_fixed: Decimal,
    pub amount_range: AmountRange,
    pub weight: u32,
    pub active: bool,
}

impl ChannelCandidate {
    pub fn from_product(product: &ChannelProduct, rate: &MerchantRate) -> Self {
        Self {
            id: product.id,
            system_channel_code: product.system_channel_code.clone(),
            upstream_channel_code: product.upstream_channel_code.clone(),
            supplier_id: product.supplier_id,
            currency: product.currency.clone(),
            channel_type: product.channel_type,
            merchant_rate: rate.rate.unwrap_or(product.default_rate),
            merchant_fixed: rate.fixed_fee.unwrap_or(product.default_fixed),
            cost_rate: product.cost_rate,
            cost_fixed: product.cost_fixed,
            amount_range: product.amount_range.clone(),
            weight: product.weight,
            active: product.active && rate.active,
        }
    }

    /// Pooled selection only considers candidates that earn a margin.
    pub fn has_margin(&self) -> bool {
        self.merchant_rate > self.cost_rate
    }
}

/// Granularity of the short-window failure tally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailureKey {
    Supplier(SupplierId),
    Route {
        supplier_id: SupplierId,
        upstream_channel_code: String,
        system_channel_code: String,
    },
}

impl FailureKey {
    pub fn supplier(candidate: &ChannelCandidate) -> Self {
        Self::Supplier(candidate.supplier_id)
    }

    pub fn route(candidate: &ChannelCandidate) -> Self {
        Self::Route {
            supplier_id: candidate.supplier_id,
            upstream_channel_code: candidate.upstream_channel_code.clone(),
            system_channel_code: candidate.system_channel_code.clone(),
        }
    }
}

impl fmt::Display for FailureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Supplier(id) => write!(f, "{id}"),
            Self::Route {
                supplier_id,
                upstream_channel_code,
                system_channel_code,
            } => write!(f, "{supplier_id}:{upstream_channel_code}:{system_channel_code}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product() -> ChannelProduct {
        ChannelProduct {
            id: 10,
            system_channel_code: "PIX".into(),
            upstream_channel_code: "pix_fast".into(),
            supplier_id: 3,
            currency: "BRL".into(),
            channel_type: ChannelType::Collection,
            cost_rate: dec!(1.0),
            cost_fixed: dec!(0),
            default_rate: dec!(2.0),
            default_fixed: dec!(0.5),
            amount_range: "1-1000".parse().unwrap(),
            weight: 10,
            active: true,
        }
    }

    #[test]
    fn test_merchant_override_wins_over_default() {
        let rate = MerchantRate {
            merchant_id: 1,
            product_id: 10,
            rate: Some(dec!(3.5)),
            fixed_fee: None,
            active: true,
        };
        let candidate = ChannelCandidate::from_product(&product(), &rate);
        assert_eq!(candidate.merchant_rate, dec!(3.5));
        assert_eq!(candidate.merchant_fixed, dec!(0.5));
        assert!(candidate.has_margin());
    }

    #[test]
    fn test_failure_key_rendering() {
        let rate = MerchantRate {
            merchant_id: 1,
            product_id: 10,
            rate: None,
            fixed_fee: None,
            active: true,
        };
        let candidate = ChannelCandidate::from_product(&product(), &rate);
        assert_eq!(FailureKey::supplier(&candidate).to_string(), "3");
        assert_eq!(FailureKey::route(&candidate).to_string(), "3:pix_fast:PIX");
    }
}
