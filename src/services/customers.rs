use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Order, Review, Role, User};
use crate::domain::value_objects::Money;
use crate::error::{EcommerceError, Result};
use crate::store::{OrderFilter, Page, ReviewFilter, Store};

#[derive(Debug, Deserialize, Validate)]
pub struct NewCustomer {
    #[validate(length(min = 2, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 10, max = 20))]
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 2, max = 255))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 10, max = 20))]
    pub phone: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(equal = 2))]
    pub state: Option<String>,
    #[validate(length(min = 8, max = 9))]
    pub zip_code: Option<String>,
    /// Admin only.
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CustomerSummary {
    #[serde(flatten)]
    pub customer: User,
    pub orders_count: usize,
}

#[derive(Debug, Serialize)]
pub struct CustomerDetail {
    pub customer: User,
    pub total_spent: Decimal,
    pub orders_count: usize,
    pub average_order_value: Decimal,
    pub recent_orders: Vec<Order>,
    pub recent_reviews: Vec<Review>,
}

#[derive(Clone)]
pub struct CustomerService {
    store: Arc<dyn Store>,
}

impl CustomerService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: NewCustomer, role: Role) -> Result<User> {
        input.validate()?;
        if self.store.get_user_by_email(&input.email).await?.is_some() {
            return Err(EcommerceError::Conflict("email already registered".into()));
        }
        let mut user = User::register(input.name.trim(), input.email, role);
        user.phone = input.phone;
        self.store.insert_user(&user).await?;
        info!(user_id = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    /// Resolves the caller's identity to an active customer.
    pub async fn authenticate(&self, id: Uuid) -> Result<User> {
        match self.store.get_user(id).await? {
            Some(user) if user.active && user.role == Role::Customer => Ok(user),
            _ => Err(EcommerceError::Unauthorized),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<User> {
        self.store.get_user(id).await?.ok_or(EcommerceError::CustomerNotFound)
    }

    async fn apply(&self, user: &mut User, update: ProfileUpdate, allow_status: bool) -> Result<()> {
        update.validate()?;
        if let Some(email) = update.email {
            let email = email.trim().to_lowercase();
            if email != user.email {
                if self.store.get_user_by_email(&email).await?.is_some() {
                    return Err(EcommerceError::Conflict("email already registered".into()));
                }
                user.email = email;
            }
        }
        if let Some(name) = update.name {
            user.name = name.trim().to_string();
        }
        user.phone = update.phone.or(user.phone.take());
        user.address = update.address.or(user.address.take());
        user.city = update.city.or(user.city.take());
        user.state = update.state.map(|s| s.to_uppercase()).or(user.state.take());
        user.zip_code = update.zip_code.or(user.zip_code.take());
        if allow_status {
            user.active = update.active.unwrap_or(user.active);
        }
        user.touch();
        self.store.update_user(user).await
    }

    pub async fn update_profile(&self, user: &User, update: ProfileUpdate) -> Result<User> {
        let mut user = user.clone();
        self.apply(&mut user, update, false).await?;
        Ok(user)
    }

    pub async fn admin_update(&self, id: Uuid, update: ProfileUpdate) -> Result<User> {
        let mut user = self.get(id).await?;
        self.apply(&mut user, update, true).await?;
        info!(user_id = %id, active = user.active, "customer updated by admin");
        Ok(user)
    }

    pub async fn estheticians(&self) -> Result<Vec<User>> {
        Ok(self.store.list_users().await?.into_iter().filter(|u| u.is_admin() && u.active).collect())
    }

    async fn customers_matching(&self, query: Option<&str>) -> Result<Vec<User>> {
        Ok(self
            .store
            .list_users()
            .await?
            .into_iter()
            .filter(|u| u.role == Role::Customer)
            .filter(|u| query.map_or(true, |q| u.matches(q)))
            .collect())
    }

    pub async fn admin_list(&self, query: Option<&str>, page: u32) -> Result<Page<CustomerSummary>> {
        let customers = self.customers_matching(query).await?;
        let orders = self.store.list_orders(&OrderFilter::default()).await?;
        Ok(Page::slice(customers, page, 15).map(|customer| CustomerSummary {
            orders_count: orders.iter().filter(|o| o.user_id == customer.id).count(),
            customer,
        }))
    }

    pub async fn admin_detail(&self, id: Uuid) -> Result<CustomerDetail> {
        let customer = self.get(id).await?;
        let orders = self.store.list_orders(&OrderFilter::for_user(id)).await?;
        let total_spent: Decimal = orders.iter().filter(|o| o.status.is_revenue()).map(|o| o.total).sum();
        let average_order_value = if orders.is_empty() {
            Decimal::ZERO
        } else {
            (total_spent / Decimal::from(orders.len())).round_dp(2)
        };
        let mut recent_reviews =
            self.store.list_reviews(&ReviewFilter { user_id: Some(id), ..ReviewFilter::default() }).await?;
        recent_reviews.truncate(5);
        Ok(CustomerDetail {
            customer,
            total_spent,
            orders_count: orders.len(),
            average_order_value,
            recent_orders: orders.into_iter().take(10).collect(),
            recent_reviews,
        })
    }

    pub async fn export_csv(&self) -> Result<String> {
        let customers = self.customers_matching(None).await?;
        let orders = self.store.list_orders(&OrderFilter::default()).await?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["name", "email", "phone", "city", "state", "orders", "total_spent", "registered_at"])?;
        for customer in customers {
            let own: Vec<&Order> = orders.iter().filter(|o| o.user_id == customer.id).collect();
            let spent: Decimal = own.iter().filter(|o| o.status.is_revenue()).map(|o| o.total).sum();
            writer.write_record([
                customer.name.as_str(),
                customer.email.as_str(),
                customer.phone.as_deref().unwrap_or(""),
                customer.city.as_deref().unwrap_or(""),
                customer.state.as_deref().unwrap_or(""),
                &own.len().to_string(),
                &Money::brl(spent).format(),
                &customer.created_at.format("%d/%m/%Y").to_string(),
            ])?;
        }
        finish_csv(writer)
    }
}

pub(crate) fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| EcommerceError::StorageError(format!("csv flush: {e}")))?;
    String::from_utf8(bytes).map_err(|e| EcommerceError::StorageError(format!("csv encoding: {e}")))
}
