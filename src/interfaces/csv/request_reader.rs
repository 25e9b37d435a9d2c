use crate::application::engine::CreateOrderRequest;
use crate::domain::channel::CandidateId;
use crate::error::{GatewayError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Query,
}

/// One line of the request batch. Query rows only need the merchant and the
/// transaction reference.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderRequestRow {
    pub action: Action,
    pub merchant_no: String,
    pub merchant_tx_ref: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub channel_code: String,
    #[serde(default)]
    pub candidate_id: Option<CandidateId>,
}

impl From<OrderRequestRow> for CreateOrderRequest {
    fn from(row: OrderRequestRow) -> Self {
        Self {
            merchant_tx_ref: row.merchant_tx_ref,
            merchant_no: row.merchant_no,
            amount: row.amount,
            currency: row.currency,
            system_channel_code: row.channel_code,
            pinned_candidate_id: row.candidate_id,
        }
    }
}

/// Reads order requests from a CSV source, trimming whitespace and tolerating
/// short rows.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows so large batches stream through.
    pub fn requests(self) -> impl Iterator<Item = Result<OrderRequestRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(GatewayError::from))
    }
}
