use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::review::average_rating;
use crate::domain::aggregates::{OrderStatus, Review, ReviewStatus, User};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{ItemKind, ItemRef, Rating};
use crate::error::{EcommerceError, Result};
use crate::services::events::EventPublisher;
use crate::store::{OrderFilter, Page, ReviewFilter, Store};

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewInput {
    pub rating: Rating,
    #[validate(length(max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 10, max = 2000))]
    pub comment: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewReview {
    pub target: ItemRef,
    #[serde(flatten)]
    #[validate]
    pub review: ReviewInput,
}

#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn Store>,
    events: EventPublisher,
}

impl ReviewService {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher) -> Self {
        Self { store, events }
    }

    async fn ensure_target_exists(&self, target: ItemRef) -> Result<()> {
        match target.kind {
            ItemKind::Product => {
                self.store.get_product(target.id).await?.filter(|p| p.is_visible()).ok_or(EcommerceError::ProductNotFound)?;
            }
            ItemKind::Service => {
                self.store.get_service(target.id).await?.filter(|s| s.is_visible()).ok_or(EcommerceError::ServiceNotFound)?;
            }
        }
        Ok(())
    }

    /// The customer received an order containing `target`.
    async fn has_purchased(&self, user_id: Uuid, target: ItemRef) -> Result<bool> {
        let filter = OrderFilter { status: Some(OrderStatus::Delivered), ..OrderFilter::for_user(user_id) };
        Ok(self.store.list_orders(&filter).await?.iter().any(|o| o.contains(target)))
    }

    #[instrument(skip(self, input), fields(user_id = %user.id))]
    pub async fn create(&self, user: &User, input: NewReview) -> Result<Review> {
        input.validate()?;
        self.ensure_target_exists(input.target).await?;

        let existing = ReviewFilter { target: Some(input.target), user_id: Some(user.id), status: None };
        if !self.store.list_reviews(&existing).await?.is_empty() {
            return Err(EcommerceError::Conflict("you have already reviewed this item".into()));
        }

        let mut review = Review::submit(
            user.id,
            input.target,
            input.review.rating,
            input.review.title,
            input.review.comment,
        );
        review.verified_purchase = self.has_purchased(user.id, input.target).await?;
        self.store.insert_review(&review).await?;
        info!(review_id = %review.id, verified = review.verified_purchase, "review submitted");
        self.events
            .publish(DomainEvent::ReviewSubmitted {
                review_id: review.id,
                target: review.target,
                rating: review.rating.value(),
            })
            .await;
        Ok(review)
    }

    async fn owned(&self, user: &User, id: Uuid) -> Result<Review> {
        let review = self.store.get_review(id).await?.ok_or(EcommerceError::ReviewNotFound)?;
        if review.user_id != user.id {
            return Err(EcommerceError::Forbidden);
        }
        Ok(review)
    }

    pub async fn update(&self, user: &User, id: Uuid, input: ReviewInput) -> Result<Review> {
        input.validate()?;
        let mut review = self.owned(user, id).await?;
        review.edit(input.rating, input.title, input.comment);
        self.store.update_review(&review).await?;
        Ok(review)
    }

    pub async fn delete(&self, user: &User, id: Uuid) -> Result<()> {
        self.owned(user, id).await?;
        self.store.delete_review(id).await
    }

    pub async fn mine(&self, user: &User) -> Result<Vec<Review>> {
        self.store.list_reviews(&ReviewFilter { user_id: Some(user.id), ..ReviewFilter::default() }).await
    }

    pub async fn approved_for(&self, target: ItemRef) -> Result<Vec<Review>> {
        let filter = ReviewFilter { target: Some(target), status: Some(ReviewStatus::Approved), user_id: None };
        self.store.list_reviews(&filter).await
    }

    pub async fn average_for(&self, target: ItemRef) -> Result<Option<Decimal>> {
        Ok(average_rating(&self.approved_for(target).await?))
    }

    /// Latest approved service reviews, shown on the home page.
    pub async fn testimonials(&self, limit: usize) -> Result<Vec<Review>> {
        let filter = ReviewFilter { status: Some(ReviewStatus::Approved), ..ReviewFilter::default() };
        Ok(self
            .store
            .list_reviews(&filter)
            .await?
            .into_iter()
            .filter(|r| r.target.kind == ItemKind::Service)
            .take(limit)
            .collect())
    }

    pub async fn admin_list(&self, status: Option<ReviewStatus>, page: u32) -> Result<Page<Review>> {
        let reviews = self.store.list_reviews(&ReviewFilter { status, ..ReviewFilter::default() }).await?;
        Ok(Page::slice(reviews, page, 20))
    }

    async fn moderate(&self, id: Uuid, action: impl FnOnce(&mut Review)) -> Result<Review> {
        let mut review = self.store.get_review(id).await?.ok_or(EcommerceError::ReviewNotFound)?;
        action(&mut review);
        self.store.update_review(&review).await?;
        info!(review_id = %id, status = %review.status, "review moderated");
        Ok(review)
    }

    pub async fn approve(&self, id: Uuid) -> Result<Review> {
        self.moderate(id, Review::approve).await
    }

    pub async fn reject(&self, id: Uuid, reason: Option<String>) -> Result<Review> {
        self.moderate(id, |r| r.reject(reason)).await
    }

    pub async fn respond(&self, id: Uuid, response: String) -> Result<Review> {
        if response.trim().is_empty() {
            return Err(EcommerceError::Validation("response cannot be empty".into()));
        }
        self.moderate(id, |r| r.respond(response)).await
    }
}
