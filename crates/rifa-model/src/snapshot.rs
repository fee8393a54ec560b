// SPDX-License-Identifier: Apache-2.0

use crate::ticket::{DocumentFields, Ticket, TicketNumber, ValidationError};
use std::collections::BTreeMap;

pub const BOARD_SIZE: usize = 100;

/// The full board as last observed from the store: only sold slots have an
/// entry, absence of an entry IS "available".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardSnapshot {
    tickets: BTreeMap<TicketNumber, Ticket>,
}

impl BoardSnapshot {
    /// Decodes a raw collection read into a snapshot. Any document with an
    /// invalid key or an undecodable body poisons the whole read; the
    /// caller keeps its previous snapshot in that case.
    pub fn from_documents<'a, I>(docs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (&'a str, &'a DocumentFields)>,
    {
        let mut tickets = BTreeMap::new();
        for (key, fields) in docs {
            let number = TicketNumber::parse_key(key)?;
            let ticket = Ticket::from_fields(fields)?;
            tickets.insert(number, ticket);
        }
        Ok(Self { tickets })
    }

    #[must_use]
    pub fn get(&self, number: TicketNumber) -> Option<&Ticket> {
        self.tickets.get(&number)
    }

    #[must_use]
    pub fn is_sold(&self, number: TicketNumber) -> bool {
        self.tickets.contains_key(&number)
    }

    #[must_use]
    pub fn sold_count(&self) -> usize {
        self.tickets.len()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        BOARD_SIZE - self.tickets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Sold slots in ticket-number order.
    pub fn iter(&self) -> impl Iterator<Item = (TicketNumber, &Ticket)> {
        self.tickets.iter().map(|(n, t)| (*n, t))
    }
}
