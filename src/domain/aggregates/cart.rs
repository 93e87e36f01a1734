//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::ItemRef;
use crate::error::{EcommerceError, Result};

pub const MAX_LINE_QUANTITY: u32 = 99;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartLine {
    pub id: Uuid,
    pub item: ItemRef,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

/// A customer's cart. Persisted as a whole by the store.
#[derive(Clone, Debug)]
pub struct Cart {
    customer_id: Uuid,
    lines: Vec<CartLine>,
    updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(customer_id: Uuid) -> Self {
        Self { customer_id, lines: vec![], updated_at: Utc::now() }
    }

    pub fn from_lines(customer_id: Uuid, lines: Vec<CartLine>) -> Self {
        let updated_at = lines.iter().map(|l| l.added_at).max().unwrap_or_else(Utc::now);
        Self { customer_id, lines, updated_at }
    }

    pub fn customer_id(&self) -> Uuid { self.customer_id }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    pub fn quantity_of(&self, item: ItemRef) -> u32 {
        self.lines.iter().find(|l| l.item == item).map_or(0, |l| l.quantity)
    }

    /// Adds `quantity` of `item`, merging into an existing line. Returns the line's new quantity.
    pub fn add_item(&mut self, item: ItemRef, quantity: u32) -> Result<u32> {
        check_quantity(quantity)?;
        let merged = self.quantity_of(item) + quantity;
        if merged > MAX_LINE_QUANTITY {
            return Err(EcommerceError::InvalidQuantity);
        }
        match self.lines.iter_mut().find(|l| l.item == item) {
            Some(line) => line.quantity = merged,
            None => self.lines.push(CartLine { id: Uuid::now_v7(), item, quantity, added_at: Utc::now() }),
        }
        self.touch();
        Ok(merged)
    }

    pub fn line(&self, line_id: Uuid) -> Result<&CartLine> {
        self.lines.iter().find(|l| l.id == line_id).ok_or(EcommerceError::CartItemNotFound)
    }

    /// Zero removes the line.
    pub fn update_quantity(&mut self, line_id: Uuid, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return self.remove_line(line_id);
        }
        check_quantity(quantity)?;
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or(EcommerceError::CartItemNotFound)?;
        line.quantity = quantity;
        self.touch();
        Ok(())
    }

    pub fn remove_line(&mut self, line_id: Uuid) -> Result<()> {
        let before = self.lines.len();
        self.lines.retain(|l| l.id != line_id);
        if self.lines.len() == before {
            return Err(EcommerceError::CartItemNotFound);
        }
        self.touch();
        Ok(())
    }

    /// Drops lines matching `predicate`, returning how many went.
    pub fn drop_lines<F: Fn(&CartLine) -> bool>(&mut self, predicate: F) -> usize {
        let before = self.lines.len();
        self.lines.retain(|l| !predicate(l));
        before - self.lines.len()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn check_quantity(quantity: u32) -> Result<()> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        Err(EcommerceError::InvalidQuantity)
    }
}
