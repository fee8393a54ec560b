// SPDX-License-Identifier: Apache-2.0

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

pub const BUYER_MAX_LEN: usize = 20;
pub const PHONE_MAX_LEN: usize = 11;

/// Plain field map of one stored document, keyed by field name.
/// Ordered so serialized forms (and their digests) are deterministic.
pub type DocumentFields = BTreeMap<String, Value>;

/// One of the 100 fixed slots on the board. The decimal rendering of the
/// number doubles as the document key in the store (`"0"`..`"99"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicketNumber(u8);

impl TicketNumber {
    pub fn parse(input: i64) -> Result<Self, ValidationError> {
        if !(0..=99).contains(&input) {
            return Err(ValidationError(format!(
                "ticket number must be in 0..=99, got {input}"
            )));
        }
        Ok(Self(input as u8))
    }

    /// Parses a store document key. Only the canonical decimal rendering is
    /// accepted; padded or signed forms would alias another key.
    pub fn parse_key(input: &str) -> Result<Self, ValidationError> {
        let n: u8 = input
            .parse()
            .map_err(|_| ValidationError(format!("invalid ticket key: {input}")))?;
        if n.to_string() != input {
            return Err(ValidationError(format!(
                "non-canonical ticket key: {input}"
            )));
        }
        Self::parse(i64::from(n))
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn key(self) -> String {
        self.0.to_string()
    }
}

impl Display for TicketNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display name of the purchaser; required once a ticket is sold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyerName(String);

impl BuyerName {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(ValidationError("buyer must not be empty".to_string()));
        }
        if s.chars().count() > BUYER_MAX_LEN {
            return Err(ValidationError(format!(
                "buyer exceeds max length {BUYER_MAX_LEN}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BuyerName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional contact string; empty means not registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phone(String);

impl Phone {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let s = input.trim();
        if s.chars().count() > PHONE_MAX_LEN {
            return Err(ValidationError(format!(
                "phone exceeds max length {PHONE_MAX_LEN}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    #[must_use]
    pub fn empty() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A sold slot. `buyer`, `phone` and `sold_at` are fixed at the time of
/// sale; `paid` is the only field that may change afterwards.
/// `to_fields`/`from_fields` are the single wire mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub buyer: BuyerName,
    pub phone: Phone,
    pub paid: bool,
    pub sold_at: i64,
}

impl Ticket {
    #[must_use]
    pub fn new(buyer: BuyerName, phone: Phone, sold_at: i64) -> Self {
        Self {
            buyer,
            phone,
            paid: false,
            sold_at,
        }
    }

    /// Renders the ticket as the field map written to the store. Field
    /// names match the legacy collection (`buyer`, `phone`, `paid`,
    /// `soldAt`) so an existing board stays readable.
    #[must_use]
    pub fn to_fields(&self) -> DocumentFields {
        let mut fields = DocumentFields::new();
        fields.insert("buyer".to_string(), Value::String(self.buyer.0.clone()));
        fields.insert("phone".to_string(), Value::String(self.phone.0.clone()));
        fields.insert("paid".to_string(), Value::Bool(self.paid));
        fields.insert("soldAt".to_string(), Value::from(self.sold_at));
        fields
    }

    pub fn from_fields(fields: &DocumentFields) -> Result<Self, ValidationError> {
        let buyer = fields
            .get("buyer")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError("document missing buyer field".to_string()))?;
        let buyer = BuyerName::parse(buyer)?;
        let phone = fields
            .get("phone")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let phone = Phone::parse(phone)?;
        let paid = fields.get("paid").and_then(Value::as_bool).unwrap_or(false);
        let sold_at = fields
            .get("soldAt")
            .and_then(Value::as_i64)
            .ok_or_else(|| ValidationError("document missing soldAt field".to_string()))?;
        Ok(Self {
            buyer,
            phone,
            paid,
            sold_at,
        })
    }
}
