//! Review Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{ItemRef, Rating};

string_enum! {
    pub enum ReviewStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub target: ItemRef,
    pub rating: Rating,
    pub title: Option<String>,
    pub comment: String,
    pub status: ReviewStatus,
    pub verified_purchase: bool,
    pub admin_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn submit(user_id: Uuid, target: ItemRef, rating: Rating, title: Option<String>, comment: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id,
            target,
            rating,
            title,
            comment: comment.into(),
            status: ReviewStatus::Pending,
            verified_purchase: false,
            admin_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Edited reviews go back through moderation.
    pub fn edit(&mut self, rating: Rating, title: Option<String>, comment: impl Into<String>) {
        self.rating = rating;
        self.title = title;
        self.comment = comment.into();
        self.status = ReviewStatus::Pending;
        self.touch();
    }

    pub fn approve(&mut self) {
        self.status = ReviewStatus::Approved;
        self.touch();
    }

    pub fn reject(&mut self, reason: Option<String>) {
        self.status = ReviewStatus::Rejected;
        if reason.is_some() {
            self.admin_response = reason;
        }
        self.touch();
    }

    pub fn respond(&mut self, response: impl Into<String>) {
        self.admin_response = Some(response.into());
        self.touch();
    }

    pub fn is_approved(&self) -> bool { self.status == ReviewStatus::Approved }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// Mean rating of approved reviews, one decimal place. `None` when there are none.
pub fn average_rating<'a>(reviews: impl IntoIterator<Item = &'a Review>) -> Option<Decimal> {
    let (sum, count) = reviews
        .into_iter()
        .filter(|r| r.is_approved())
        .fold((0u32, 0u32), |(sum, count), r| (sum + u32::from(r.rating.value()), count + 1));
    (count > 0).then(|| (Decimal::from(sum) / Decimal::from(count)).round_dp(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(stars: u8) -> Review {
        Review::submit(
            Uuid::now_v7(),
            ItemRef::product(Uuid::now_v7()),
            Rating::new(stars).unwrap(),
            None,
            "Ótimo produto",
        )
    }

    #[test]
    fn test_moderation_flow() {
        let mut r = review(5);
        assert_eq!(r.status, ReviewStatus::Pending);
        r.approve();
        assert!(r.is_approved());
        r.edit(Rating::new(4).unwrap(), Some("Bom".into()), "Muito bom");
        assert_eq!(r.status, ReviewStatus::Pending);
        r.reject(Some("Linguagem imprópria".into()));
        assert_eq!(r.status, ReviewStatus::Rejected);
        assert_eq!(r.admin_response.as_deref(), Some("Linguagem imprópria"));
    }

    #[test]
    fn test_average_counts_only_approved() {
        let mut a = review(5);
        let mut b = review(4);
        let c = review(1);
        a.approve();
        b.approve();
        assert_eq!(average_rating([&a, &b, &c]), Some(Decimal::new(45, 1)));
        assert_eq!(average_rating([&c]), None);
    }
}
