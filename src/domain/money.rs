use crate::error::GatewayError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A strictly positive order amount.
///
/// Wraps `rust_decimal::Decimal` so that a zero or negative amount can never
/// reach channel ranking or settlement.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, GatewayError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(GatewayError::MalformedAmount(format!(
                "amount must be positive, got {value}"
            )))
        }
    }

    /// Parses a client supplied amount string.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GatewayError::MissingField("amount"));
        }
        let value = Decimal::from_str(trimmed)
            .map_err(|_| GatewayError::MalformedAmount(trimmed.to_string()))?;
        Self::new(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = GatewayError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admissible {
    Between(Decimal, Decimal),
    Exactly(Decimal),
}

/// The amounts a channel product accepts: a union of closed intervals
/// (`"10-500"`) and fixed values (`"1000"`), comma separated.
///
/// An empty expression admits any amount.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AmountRange {
    raw: String,
    parts: Vec<Admissible>,
}

impl AmountRange {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn contains(&self, amount: Decimal) -> bool {
        if self.parts.is_empty() {
            return true;
        }
        self.parts.iter().any(|part| match *part {
            Admissible::Between(min, max) => amount >= min && amount <= max,
            Admissible::Exactly(value) => amount == value,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for AmountRange {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = Vec::new();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let parse = |v: &str| {
                Decimal::from_str(v.trim()).map_err(|_| {
                    GatewayError::ValidationError(format!("invalid amount range segment: {token}"))
                })
            };
            let part = match token.split_once('-') {
                Some((min, max)) => {
                    let (min, max) = (parse(min)?, parse(max)?);
                    if min > max {
                        return Err(GatewayError::ValidationError(format!(
                            "amount range {token} has min above max"
                        )));
                    }
                    Admissible::Between(min, max)
                }
                None => Admissible::Exactly(parse(token)?),
            };
            parts.push(part);
        }
        Ok(Self {
            raw: s.trim().to_string(),
            parts,
        })
    }
}

impl Serialize for AmountRange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for AmountRange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
