// SPDX-License-Identifier: Apache-2.0

use rifa_model::ValidationError;
use rifa_store::StoreError;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum SellError {
    /// Rejected before any store round trip.
    InvalidInput(ValidationError),
    /// The number is already taken; carries the holder's name for display.
    AlreadySold { existing_buyer: String },
    Store(StoreError),
}

impl Display for SellError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(e) => write!(f, "invalid sell input: {e}"),
            Self::AlreadySold { existing_buyer } => {
                write!(f, "ticket already sold to {existing_buyer}")
            }
            Self::Store(e) => write!(f, "sell failed: {e}"),
        }
    }
}

impl std::error::Error for SellError {}

impl From<StoreError> for SellError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[derive(Debug)]
pub enum ToggleError {
    InvalidNumber(ValidationError),
    /// Payment status is meaningless before the slot is sold.
    NotSold,
    Store(StoreError),
}

impl Display for ToggleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber(e) => write!(f, "invalid ticket number: {e}"),
            Self::NotSold => write!(f, "ticket is not sold"),
            Self::Store(e) => write!(f, "payment toggle failed: {e}"),
        }
    }
}

impl std::error::Error for ToggleError {}

impl From<StoreError> for ToggleError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
