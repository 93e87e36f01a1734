//! Stock levels, adjustments and the inventory log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EcommerceError, Result};

string_enum! {
    pub enum StockStatus {
        InStock => "in_stock",
        LowStock => "low_stock",
        OutOfStock => "out_of_stock",
    }
}

impl StockStatus {
    pub fn for_quantity(stock: i32, threshold: i32) -> Self {
        if stock <= 0 {
            StockStatus::OutOfStock
        } else if stock <= threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StockStatus::InStock => "In stock",
            StockStatus::LowStock => "Low stock",
            StockStatus::OutOfStock => "Out of stock",
        }
    }
}

string_enum! {
    pub enum InventoryChangeKind {
        Addition => "addition",
        Reduction => "reduction",
        Set => "set",
        Reservation => "reservation",
        Release => "release",
        Confirmation => "confirmation",
        Import => "import",
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InventoryLog {
    pub id: Uuid,
    pub product_id: Uuid,
    pub previous_stock: i32,
    pub new_stock: i32,
    pub adjustment: i32,
    pub kind: InventoryChangeKind,
    pub reason: Option<String>,
    pub order_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InventoryLog {
    pub fn record(change: &StockChange, kind: InventoryChangeKind, reason: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            product_id: change.product_id,
            previous_stock: change.previous,
            new_stock: change.current,
            adjustment: change.current - change.previous,
            kind,
            reason,
            order_id: None,
            user_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_order(mut self, order_id: Uuid) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn by_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }
}

/// Manual stock adjustment requested by an admin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "quantity", rename_all = "snake_case")]
pub enum Adjustment {
    Set(i32),
    Add(i32),
    Subtract(i32),
}

/// Outcome of applying an [`Adjustment`] to a stock level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdjustedStock {
    pub new_stock: i32,
    /// A subtraction asked for more than was on hand and stopped at zero.
    pub clamped: bool,
}

impl Adjustment {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Adjustment::Set(q) if q < 0 => Err(EcommerceError::Validation("stock cannot be set below zero".into())),
            Adjustment::Add(q) | Adjustment::Subtract(q) if q <= 0 => {
                Err(EcommerceError::Validation("adjustment quantity must be positive".into()))
            }
            _ => Ok(()),
        }
    }

    pub fn apply(&self, current: i32) -> Result<AdjustedStock> {
        self.validate()?;
        Ok(match *self {
            Adjustment::Set(q) => AdjustedStock { new_stock: q, clamped: false },
            Adjustment::Add(q) => AdjustedStock { new_stock: current.saturating_add(q), clamped: false },
            Adjustment::Subtract(q) => {
                let raw = current.saturating_sub(q);
                AdjustedStock { new_stock: raw.max(0), clamped: raw < 0 }
            }
        })
    }

    pub fn kind(&self) -> InventoryChangeKind {
        match self {
            Adjustment::Set(_) => InventoryChangeKind::Set,
            Adjustment::Add(_) => InventoryChangeKind::Addition,
            Adjustment::Subtract(_) => InventoryChangeKind::Reduction,
        }
    }
}

/// Signed stock movement for one product, applied by the store inside a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockMove {
    pub product_id: Uuid,
    pub delta: i32,
    pub kind: InventoryChangeKind,
}

impl StockMove {
    pub fn reserve(product_id: Uuid, quantity: u32) -> Self {
        Self { product_id, delta: -to_i32(quantity), kind: InventoryChangeKind::Reservation }
    }

    pub fn release(product_id: Uuid, quantity: u32) -> Self {
        Self { product_id, delta: to_i32(quantity), kind: InventoryChangeKind::Release }
    }
}

fn to_i32(quantity: u32) -> i32 {
    i32::try_from(quantity).unwrap_or(i32::MAX)
}

/// A stock level before and after a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockChange {
    pub product_id: Uuid,
    pub previous: i32,
    pub current: i32,
    pub threshold: i32,
}

impl StockChange {
    /// Reached zero from a positive level.
    pub fn depleted(&self) -> bool {
        self.previous > 0 && self.current <= 0
    }

    /// Dropped into the low band from above it.
    pub fn became_low(&self) -> bool {
        self.previous > self.threshold && self.current > 0 && self.current <= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_status_thresholds() {
        assert_eq!(StockStatus::for_quantity(0, 5), StockStatus::OutOfStock);
        assert_eq!(StockStatus::for_quantity(-2, 5), StockStatus::OutOfStock);
        assert_eq!(StockStatus::for_quantity(5, 5), StockStatus::LowStock);
        assert_eq!(StockStatus::for_quantity(6, 5), StockStatus::InStock);
    }

    #[test]
    fn test_adjustments() {
        assert_eq!(Adjustment::Set(7).apply(3).unwrap(), AdjustedStock { new_stock: 7, clamped: false });
        assert_eq!(Adjustment::Add(4).apply(3).unwrap().new_stock, 7);
        assert_eq!(Adjustment::Subtract(10).apply(3).unwrap(), AdjustedStock { new_stock: 0, clamped: true });
        assert!(Adjustment::Set(-1).apply(3).is_err());
        assert!(Adjustment::Add(0).apply(3).is_err());
        assert!(Adjustment::Subtract(-4).apply(3).is_err());
        assert_eq!(Adjustment::Subtract(1).kind(), InventoryChangeKind::Reduction);
    }

    #[test]
    fn test_adjustment_json_shape() {
        let parsed: Adjustment = serde_json::from_str(r#"{"type":"add","quantity":3}"#).unwrap();
        assert_eq!(parsed, Adjustment::Add(3));
    }

    #[test]
    fn test_threshold_crossings() {
        let id = Uuid::now_v7();
        let change = StockChange { product_id: id, previous: 8, current: 4, threshold: 5 };
        assert!(change.became_low());
        assert!(!change.depleted());
        let change = StockChange { product_id: id, previous: 4, current: 0, threshold: 5 };
        assert!(change.depleted());
        assert!(!change.became_low());
        let change = StockChange { product_id: id, previous: 4, current: 3, threshold: 5 };
        assert!(!change.became_low());
    }

    #[test]
    fn test_log_records_adjustment() {
        let change = StockChange { product_id: Uuid::now_v7(), previous: 10, current: 7, threshold: 5 };
        let order_id = Uuid::now_v7();
        let log = InventoryLog::record(&change, InventoryChangeKind::Reservation, None).for_order(order_id);
        assert_eq!(log.adjustment, -3);
        assert_eq!(log.order_id, Some(order_id));
    }
}
