//! Service Aggregate: bookable treatments.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::product::Sellable;
use crate::domain::value_objects::ItemRef;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub duration_minutes: i32,
    pub category_id: Option<Uuid>,
    pub featured: bool,
    pub active: bool,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Service {
    pub fn create(name: impl Into<String>, slug: impl Into<String>, price: Decimal, duration_minutes: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            slug: slug.into(),
            description: None,
            price,
            sale_price: None,
            duration_minutes,
            category_id: None,
            featured: false,
            active: true,
            image: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn item_ref(&self) -> ItemRef { ItemRef::service(self.id) }

    pub fn is_visible(&self) -> bool { self.active && self.deleted_at.is_none() }

    /// `"1h 30min"`, `"45min"`, `"2h"`.
    pub fn formatted_duration(&self) -> String {
        let hours = self.duration_minutes / 60;
        let minutes = self.duration_minutes % 60;
        match (hours, minutes) {
            (0, m) => format!("{m}min"),
            (h, 0) => format!("{h}h"),
            (h, m) => format!("{h}h {m}min"),
        }
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

impl Sellable for Service {
    fn price(&self) -> Decimal { self.price }
    fn sale_price(&self) -> Option<Decimal> { self.sale_price }
}
