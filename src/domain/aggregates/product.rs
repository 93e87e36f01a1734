//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::inventory::StockStatus;
use crate::domain::value_objects::{ItemRef, Money, Sku};

/// Pricing shared by products and services.
pub trait Sellable {
    fn price(&self) -> Decimal;
    fn sale_price(&self) -> Option<Decimal>;

    fn is_on_sale(&self) -> bool {
        matches!(self.sale_price(), Some(sale) if sale < self.price())
    }

    fn current_price(&self) -> Decimal {
        match self.sale_price() {
            Some(sale) if sale < self.price() => sale,
            _ => self.price(),
        }
    }

    /// Whole-percent discount, rounded half away from zero.
    fn discount_percentage(&self) -> u32 {
        if !self.is_on_sale() || self.price().is_zero() {
            return 0;
        }
        let off = (self.price() - self.current_price()) / self.price() * Decimal::ONE_HUNDRED;
        off.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u32()
            .unwrap_or(0)
    }

    fn formatted_price(&self) -> String {
        Money::brl(self.current_price()).format()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub sku: Sku,
    pub description: Option<String>,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub featured: bool,
    pub active: bool,
    pub image: Option<String>,
    pub weight: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn create(sku: Sku, name: impl Into<String>, slug: impl Into<String>, price: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            slug: slug.into(),
            sku,
            description: None,
            price,
            sale_price: None,
            category_id: None,
            stock_quantity: 0,
            low_stock_threshold: 5,
            featured: false,
            active: true,
            image: None,
            weight: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn item_ref(&self) -> ItemRef { ItemRef::product(self.id) }

    /// Listed in the storefront: active and not soft-deleted.
    pub fn is_visible(&self) -> bool { self.active && self.deleted_at.is_none() }

    pub fn is_in_stock(&self) -> bool { self.stock_quantity > 0 }

    pub fn has_stock_for(&self, quantity: u32) -> bool {
        i64::from(self.stock_quantity) >= i64::from(quantity)
    }

    pub fn stock_status(&self) -> StockStatus {
        StockStatus::for_quantity(self.stock_quantity, self.low_stock_threshold)
    }

    pub fn soft_delete(&mut self) {
        self.deleted_at = Some(Utc::now());
        self.active = false;
        self.touch();
    }

    pub fn toggle_featured(&mut self) -> bool {
        self.featured = !self.featured;
        self.touch();
        self.featured
    }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

impl Sellable for Product {
    fn price(&self) -> Decimal { self.price }
    fn sale_price(&self) -> Option<Decimal> { self.sale_price }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serum() -> Product {
        Product::create(Sku::new("ser-001").unwrap(), "Sérum Vitamina C", "serum-vitamina-c", Decimal::new(12990, 2))
    }

    #[test]
    fn test_product_create() {
        let p = serum();
        assert_eq!(p.sku.as_str(), "SER-001");
        assert!(p.is_visible());
        assert!(!p.is_in_stock());
        assert_eq!(p.stock_status(), StockStatus::OutOfStock);
    }

    #[test]
    fn test_sale_pricing() {
        let mut p = serum();
        p.price = Decimal::new(100, 0);
        assert_eq!(p.current_price(), Decimal::new(100, 0));
        assert_eq!(p.discount_percentage(), 0);

        p.sale_price = Some(Decimal::new(75, 0));
        assert!(p.is_on_sale());
        assert_eq!(p.current_price(), Decimal::new(75, 0));
        assert_eq!(p.discount_percentage(), 25);

        // a "sale" above the list price is ignored
        p.sale_price = Some(Decimal::new(120, 0));
        assert_eq!(p.current_price(), Decimal::new(100, 0));
        assert_eq!(p.discount_percentage(), 0);
    }

    #[test]
    fn test_discount_rounds_half_up() {
        let mut p = serum();
        p.price = Decimal::new(200, 0);
        p.sale_price = Some(Decimal::new(199, 0));
        // 0.5% rounds to 1
        assert_eq!(p.discount_percentage(), 1);
    }

    #[test]
    fn test_stock_checks() {
        let mut p = serum();
        p.stock_quantity = 3;
        assert!(p.has_stock_for(3));
        assert!(!p.has_stock_for(4));
        assert_eq!(p.stock_status(), StockStatus::LowStock);
        p.soft_delete();
        assert!(!p.is_visible());
    }
}
