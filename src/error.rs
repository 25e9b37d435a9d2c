use crate::domain::channel::CandidateId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Coarse classification of a [`GatewayError`], used to choose client messaging
/// and whether an operator needs to look at pricing or catalog data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Resolution,
    RiskControl,
    Persistence,
    Upstream,
    Internal,
    Io,
}

/// Failure of a single outbound call to an upstream supplier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("upstream call timed out after {0} ms")]
    Timeout(u64),
    #[error("upstream rejected the order: {0}")]
    Rejected(String),
    #[error("upstream transport failure: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("malformed amount: {0}")]
    MalformedAmount(String),
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("merchant not found: {0}")]
    MerchantNotFound(String),
    #[error("merchant is not active: {0}")]
    MerchantInactive(String),
    #[error("system channel not found: {0}")]
    ChannelNotFound(String),
    #[error("system channel is disabled: {0}")]
    ChannelDisabled(String),
    #[error("merchant {merchant_no} is not bound to channel {channel_code}/{currency}")]
    ChannelNotBound {
        merchant_no: String,
        channel_code: String,
        currency: String,
    },
    #[error("channel candidate not found or disabled: {0}")]
    CandidateNotFound(CandidateId),
    #[error("no channel available for {channel_code}/{currency}")]
    NoChannelAvailable {
        channel_code: String,
        currency: String,
    },
    #[error("order not found for merchant transaction reference {0}")]
    OrderNotFound(String),

    #[error("no eligible channel: amount {0} outside every admissible range")]
    AmountOutOfRange(Decimal),
    #[error("no eligible channel: merchant fee does not exceed upstream cost")]
    FeeBelowCost,

    #[error("storage error: {0}")]
    Storage(String),
    #[error("cache error: {0}")]
    Cache(String),

    #[error("candidate {candidate_id} failed: {source}")]
    Upstream {
        candidate_id: CandidateId,
        #[source]
        source: UpstreamError,
    },

    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[cfg(feature = "cache-redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_) | Self::MalformedAmount(_) | Self::ValidationError(_) => {
                ErrorKind::Validation
            }
            Self::MerchantNotFound(_)
            | Self::MerchantInactive(_)
            | Self::ChannelNotFound(_)
            | Self::ChannelDisabled(_)
            | Self::ChannelNotBound { .. }
            | Self::CandidateNotFound(_)
            | Self::NoChannelAvailable { .. }
            | Self::OrderNotFound(_) => ErrorKind::Resolution,
            Self::AmountOutOfRange(_) | Self::FeeBelowCost => ErrorKind::RiskControl,
            Self::Storage(_) | Self::Cache(_) | Self::JsonError(_) => ErrorKind::Persistence,
            #[cfg(feature = "storage-rocksdb")]
            Self::RocksDb(_) => ErrorKind::Persistence,
            #[cfg(feature = "cache-redis")]
            Self::Redis(_) => ErrorKind::Persistence,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Config(_) | Self::Internal(_) => ErrorKind::Internal,
            Self::CsvError(_) | Self::IoError(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
