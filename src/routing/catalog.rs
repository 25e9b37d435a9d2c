use crate::coalesce::Coalescer;
use crate::domain::channel::{
    CandidateId, ChannelCandidate, Merchant, MerchantChannel, MerchantRate, SystemChannel,
};
use crate::domain::ports::CatalogStoreRef;
use crate::error::{GatewayError, Result};
use std::collections::HashMap;
use tracing::debug;

/// Loads merchants, channels and the candidates a merchant may route to,
/// with the merchant's own pricing folded into each candidate.
pub struct CatalogResolver {
    store: CatalogStoreRef,
    merchants: Coalescer<String, Option<Merchant>>,
    channels: Coalescer<String, Option<SystemChannel>>,
}

impl CatalogResolver {
    pub fn new(store: CatalogStoreRef) -> Self {
        Self {
            store,
            merchants: Coalescer::new(),
            channels: Coalescer::new(),
        }
    }

    /// Returns the merchant if it exists, whether or not it is active.
    pub async fn find_merchant(&self, merchant_no: &str) -> Result<Option<Merchant>> {
        let store = self.store.clone();
        let no = merchant_no.to_string();
        self.merchants
            .load(no.clone(), || async move { store.merchant_by_no(&no).await })
            .await
    }

    pub async fn merchant(&self, merchant_no: &str) -> Result<Merchant> {
        match self.find_merchant(merchant_no).await? {
            Some(merchant) if merchant.active => Ok(merchant),
            Some(_) => Err(GatewayError::MerchantInactive(merchant_no.to_string())),
            None => Err(GatewayError::MerchantNotFound(merchant_no.to_string())),
        }
    }

    pub async fn system_channel(&self, code: &str) -> Result<SystemChannel> {
        let store = self.store.clone();
        let key = code.to_string();
        let channel = self
            .channels
            .load(key.clone(), || async move { store.system_channel(&key).await })
            .await?;
        match channel {
            Some(channel) if channel.active => Ok(channel),
            Some(_) => Err(GatewayError::ChannelDisabled(code.to_string())),
            None => Err(GatewayError::ChannelNotFound(code.to_string())),
        }
    }

    pub async fn binding(
        &self,
        merchant: &Merchant,
        channel: &SystemChannel,
        currency: &str,
    ) -> Result<MerchantChannel> {
        self.store
            .merchant_channel(merchant.id, &channel.code, currency, channel.channel_type)
            .await?
            .filter(|binding| binding.active)
            .ok_or_else(|| GatewayError::ChannelNotBound {
                merchant_no: merchant.merchant_no.clone(),
                channel_code: channel.code.clone(),
                currency: currency.to_string(),
            })
    }

    async fn rates_by_product(&self, merchant: &Merchant) -> Result<HashMap<CandidateId, MerchantRate>> {
        Ok(self
            .store
            .merchant_rates(merchant.id)
            .await?
            .into_iter()
            .map(|rate| (rate.product_id, rate))
            .collect())
    }

    /// Every enabled candidate for pooled dispatch.
    pub async fn pooled(
        &self,
        merchant: &Merchant,
        channel: &SystemChannel,
        currency: &str,
    ) -> Result<Vec<ChannelCandidate>> {
        let rates = self.rates_by_product(merchant).await?;
        let products = self
            .store
            .products(&channel.code, currency, channel.channel_type)
            .await?;

        let mut candidates = Vec::with_capacity(products.len());
        for product in products.iter().filter(|p| p.active) {
            let Some(rate) = rates.get(&product.id).filter(|r| r.active) else {
                continue;
            };
            if !self.supplier_active(product.supplier_id).await? {
                continue;
            }
            candidates.push(ChannelCandidate::from_product(product, rate));
        }

        debug!(
            merchant_no = %merchant.merchant_no,
            channel_code = %channel.code,
            currency,
            count = candidates.len(),
            "Resolved pooled candidates"
        );
        if candidates.is_empty() {
            return Err(GatewayError::NoChannelAvailable {
                channel_code: channel.code.clone(),
                currency: currency.to_string(),
            });
        }
        Ok(candidates)
    }

    /// One explicitly chosen candidate. Without a merchant rate entry the
    /// product's default pricing applies.
    pub async fn pinned(
        &self,
        merchant: &Merchant,
        channel: &SystemChannel,
        currency: &str,
        id: CandidateId,
    ) -> Result<ChannelCandidate> {
        let product = self
            .store
            .product(id)
            .await?
            .filter(|p| {
                p.active
                    && p.system_channel_code == channel.code
                    && p.currency == currency
                    && p.channel_type == channel.channel_type
            })
            .ok_or(GatewayError::CandidateNotFound(id))?;
        if !self.supplier_active(product.supplier_id).await? {
            return Err(GatewayError::CandidateNotFound(id));
        }

        let rate = self
            .rates_by_product(merchant)
            .await?
            .remove(&id)
            .unwrap_or(MerchantRate {
                merchant_id: merchant.id,
                product_id: id,
                rate: None,
                fixed_fee: None,
                active: true,
            });
        if !rate.active {
            return Err(GatewayError::CandidateNotFound(id));
        }
        Ok(ChannelCandidate::from_product(&product, &rate))
    }

    async fn supplier_active(&self, supplier_id: u64) -> Result<bool> {
        Ok(self
            .store
            .supplier(supplier_id)
            .await?
            .is_some_and(|s| s.active))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::{ChannelProduct, ChannelType, Supplier};
    use crate::infrastructure::in_memory::{CatalogSnapshot, InMemoryCatalogStore};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn product(id: u64, supplier_id: u64, active: bool) -> ChannelProduct {
        ChannelProduct {
            id,
            system_channel_code: "PIX".into(),
            upstream_channel_code: format!("pix_{id}"),
            supplier_id,
            currency: "BRL".into(),
            channel_type: ChannelType::Collection,
            cost_rate: dec!(1),
            cost_fixed: dec!(0),
            default_rate: dec!(2),
            default_fixed: dec!(0),
            amount_range: "1-1000".parse().unwrap(),
            weight: 10,
            active,
        }
    }

    fn rate(product_id: u64, active: bool) -> MerchantRate {
        MerchantRate {
            merchant_id: 1,
            product_id,
            rate: Some(dec!(3)),
            fixed_fee: None,
            active,
        }
    }

    fn resolver() -> CatalogResolver {
        let snapshot = CatalogSnapshot {
            merchants: vec![
                Merchant {
                    id: 1,
                    merchant_no: "M1".into(),
                    name: String::new(),
                    active: true,
                },
                Merchant {
                    id: 2,
                    merchant_no: "M2".into(),
                    name: String::new(),
                    active: false,
                },
            ],
            system_channels: vec![SystemChannel {
                code: "PIX".into(),
                name: String::new(),
                channel_type: ChannelType::Collection,
                active: true,
            }],
            merchant_channels: vec![MerchantChannel {
                merchant_id: 1,
                channel_code: "PIX".into(),
                currency: "BRL".into(),
                channel_type: ChannelType::Collection,
                active: true,
            }],
            products: vec![
                product(10, 100, true),
                product(11, 100, false),
                product(12, 200, true),
                product(13, 100, true),
                product(14, 100, true),
            ],
            merchant_rates: vec![rate(10, true), rate(11, true), rate(12, true), rate(13, false)],
            suppliers: vec![
                Supplier {
                    id: 100,
                    name: String::new(),
                    active: true,
                },
                Supplier {
                    id: 200,
                    name: String::new(),
                    active: false,
                },
            ],
        };
        CatalogResolver::new(Arc::new(InMemoryCatalogStore::new(snapshot)))
    }

    #[tokio::test]
    async fn test_merchant_failures_are_distinct() {
        let resolver = resolver();
        assert!(resolver.merchant("M1").await.is_ok());
        assert!(matches!(
            resolver.merchant("M2").await,
            Err(GatewayError::MerchantInactive(_))
        ));
        assert!(matches!(
            resolver.merchant("M3").await,
            Err(GatewayError::MerchantNotFound(_))
        ));
        assert!(matches!(
            resolver.system_channel("SPEI").await,
            Err(GatewayError::ChannelNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pooled_keeps_only_enabled_candidates() {
        let resolver = resolver();
        let merchant = resolver.merchant("M1").await.unwrap();
        let channel = resolver.system_channel("PIX").await.unwrap();
        resolver.binding(&merchant, &channel, "BRL").await.unwrap();

        let candidates = resolver.pooled(&merchant, &channel, "BRL").await.unwrap();
        let ids: Vec<_> = candidates.iter().map(|c| c.id).collect();
        // 11 inactive product, 12 inactive supplier, 13 inactive rate, 14 no rate.
        assert_eq!(ids, vec![10]);
        assert_eq!(candidates[0].merchant_rate, dec!(3));
    }

    #[tokio::test]
    async fn test_missing_binding_and_empty_pool() {
        let resolver = resolver();
        let merchant = resolver.merchant("M1").await.unwrap();
        let channel = resolver.system_channel("PIX").await.unwrap();
        assert!(matches!(
            resolver.binding(&merchant, &channel, "USD").await,
            Err(GatewayError::ChannelNotBound { .. })
        ));
        assert!(matches!(
            resolver.pooled(&merchant, &channel, "USD").await,
            Err(GatewayError::NoChannelAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_pinned_falls_back_to_default_pricing() {
        let resolver = resolver();
        let merchant = resolver.merchant("M1").await.unwrap();
        let channel = resolver.system_channel("PIX").await.unwrap();

        let pinned = resolver.pinned(&merchant, &channel, "BRL", 14).await.unwrap();
        assert_eq!(pinned.merchant_rate, dec!(2));
        assert!(matches!(
            resolver.pinned(&merchant, &channel, "BRL", 13).await,
            Err(GatewayError::CandidateNotFound(13))
        ));
        assert!(matches!(
            resolver.pinned(&merchant, &channel, "BRL", 12).await,
            Err(GatewayError::CandidateNotFound(12))
        ));
    }
}
