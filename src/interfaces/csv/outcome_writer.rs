use crate::application::engine::{CreateOrderResponse, OrderView};
use crate::domain::channel::CandidateId;
use crate::error::{GatewayError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// One result line; exactly one of `order_id` or `error` is populated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRow {
    pub action: &'static str,
    pub merchant_no: String,
    pub merchant_tx_ref: String,
    pub order_id: Option<String>,
    pub status: Option<String>,
    pub amount: Option<Decimal>,
    pub candidate_id: Option<CandidateId>,
    pub error: Option<String>,
}

impl OutcomeRow {
    pub fn created(merchant_no: &str, merchant_tx_ref: &str, response: &CreateOrderResponse) -> Self {
        Self {
            action: "create",
            merchant_no: merchant_no.to_string(),
            merchant_tx_ref: merchant_tx_ref.to_string(),
            order_id: Some(response.platform_order_id.clone()),
            status: Some(response.status.to_string()),
            amount: None,
            candidate_id: Some(response.candidate_id),
            error: None,
        }
    }

    pub fn queried(merchant_no: &str, merchant_tx_ref: &str, view: &OrderView) -> Self {
        Self {
            action: "query",
            merchant_no: merchant_no.to_string(),
            merchant_tx_ref: merchant_tx_ref.to_string(),
            order_id: Some(view.platform_order_id.clone()),
            status: Some(view.status.to_string()),
            amount: Some(view.amount),
            candidate_id: None,
            error: None,
        }
    }

    pub fn failed(
        action: &'static str,
        merchant_no: &str,
        merchant_tx_ref: &str,
        error: &GatewayError,
    ) -> Self {
        Self {
            action,
            merchant_no: merchant_no.to_string(),
            merchant_tx_ref: merchant_tx_ref.to_string(),
            order_id: None,
            status: None,
            amount: None,
            candidate_id: None,
            error: Some(error.to_string()),
        }
    }
}

pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write(&mut self, row: &OutcomeRow) -> Result<()> {
        self.writer.serialize(row)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
