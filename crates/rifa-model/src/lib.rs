// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod snapshot;
mod ticket;

pub use snapshot::{BoardSnapshot, BOARD_SIZE};
pub use ticket::{
    BuyerName, DocumentFields, Phone, Ticket, TicketNumber, ValidationError, BUYER_MAX_LEN,
    PHONE_MAX_LEN,
};

pub const CRATE_NAME: &str = "rifa-model";
