//! Storefront catalog: products, services and categories.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::category::{breadcrumb, descendant_ids};
use crate::domain::aggregates::review::average_rating;
use crate::domain::aggregates::{
    Category, CategoryKind, InventoryChangeKind, InventoryLog, Product, Review, Sellable, Service, StockChange,
    StockStatus,
};
use crate::domain::value_objects::{Sku, Slug};
use crate::error::{EcommerceError, Result};
use crate::services::reviews::ReviewService;
use crate::store::{Page, Store};

pub const DEFAULT_PER_PAGE: u32 = 12;
pub const MAX_PER_PAGE: u32 = 100;

string_enum! {
    pub enum CatalogSort {
        Newest => "newest",
        PriceAsc => "price_asc",
        PriceDesc => "price_desc",
        Name => "name",
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub q: Option<String>,
    /// Category slug; descendants are included.
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: Option<CatalogSort>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl CatalogQuery {
    fn page(&self) -> u32 { self.page.unwrap_or(1).max(1) }
    fn per_page(&self) -> u32 { self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE) }
}

#[derive(Clone, Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub current_price: Decimal,
    pub formatted_price: String,
    pub on_sale: bool,
    pub discount_percentage: u32,
    pub stock_status: StockStatus,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self {
            current_price: product.current_price(),
            formatted_price: product.formatted_price(),
            on_sale: product.is_on_sale(),
            discount_percentage: product.discount_percentage(),
            stock_status: product.stock_status(),
            product,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ServiceView {
    #[serde(flatten)]
    pub service: Service,
    pub current_price: Decimal,
    pub formatted_price: String,
    pub on_sale: bool,
    pub discount_percentage: u32,
    pub formatted_duration: String,
}

impl From<Service> for ServiceView {
    fn from(service: Service) -> Self {
        Self {
            current_price: service.current_price(),
            formatted_price: service.formatted_price(),
            on_sale: service.is_on_sale(),
            discount_percentage: service.discount_percentage(),
            formatted_duration: service.formatted_duration(),
            service,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    pub product: ProductView,
    pub category: Option<Category>,
    pub average_rating: Option<Decimal>,
    pub review_count: usize,
    pub reviews: Vec<Review>,
    pub related: Vec<ProductView>,
}

#[derive(Debug, Serialize)]
pub struct ServiceDetail {
    pub service: ServiceView,
    pub category: Option<Category>,
    pub average_rating: Option<Decimal>,
    pub review_count: usize,
    pub reviews: Vec<Review>,
    pub related: Vec<ServiceView>,
}

#[derive(Debug, Serialize)]
pub struct CategoryDetail {
    pub category: Category,
    pub path: String,
    pub children: Vec<Category>,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub products: Vec<ProductView>,
    pub services: Vec<ServiceView>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub slug: Option<String>,
    #[validate(length(max = 50))]
    pub sku: Option<String>,
    pub description: Option<String>,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    /// Opening stock; ignored on update.
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    #[validate(range(min = 0))]
    pub low_stock_threshold: Option<i32>,
    #[serde(default)]
    pub featured: bool,
    pub active: Option<bool>,
    #[validate(url)]
    pub image: Option<String>,
    pub weight: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ServiceInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub slug: Option<String>,
    pub description: Option<String>,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    #[validate(range(min = 5, max = 720))]
    pub duration_minutes: i32,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub featured: bool,
    pub active: Option<bool>,
    #[validate(url)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub kind: CategoryKind,
    pub active: Option<bool>,
    pub display_order: Option<i32>,
}

fn check_prices(price: Decimal, sale_price: Option<Decimal>) -> Result<()> {
    if price.is_sign_negative() {
        return Err(EcommerceError::Validation("price cannot be negative".into()));
    }
    if let Some(sale) = sale_price {
        if sale.is_sign_negative() || sale >= price {
            return Err(EcommerceError::Validation("sale price must be below the regular price".into()));
        }
    }
    Ok(())
}

fn slug_for(explicit: Option<&str>, name: &str) -> Result<String> {
    let slug = Slug::from_name(explicit.unwrap_or(name));
    if slug.is_empty() {
        return Err(EcommerceError::Validation("slug cannot be empty".into()));
    }
    Ok(slug.into_string())
}

fn matches_text(query: &str, name: &str, description: Option<&str>) -> bool {
    let needle = query.to_lowercase();
    name.to_lowercase().contains(&needle)
        || description.is_some_and(|d| d.to_lowercase().contains(&needle))
}

fn in_price_range(price: Decimal, query: &CatalogQuery) -> bool {
    query.min_price.map_or(true, |min| price >= min) && query.max_price.map_or(true, |max| price <= max)
}

fn sort_items<T: Sellable>(items: &mut [T], sort: CatalogSort, name: impl Fn(&T) -> &str) {
    match sort {
        // store listings already come newest first
        CatalogSort::Newest => {}
        CatalogSort::PriceAsc => items.sort_by_key(|i| i.current_price()),
        CatalogSort::PriceDesc => items.sort_by(|a, b| b.current_price().cmp(&a.current_price())),
        CatalogSort::Name => items.sort_by(|a, b| name(a).to_lowercase().cmp(&name(b).to_lowercase())),
    }
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    reviews: ReviewService,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, reviews: ReviewService) -> Self {
        Self { store, reviews }
    }

    async fn visible_products(&self) -> Result<Vec<Product>> {
        Ok(self.store.list_products().await?.into_iter().filter(Product::is_visible).collect())
    }

    async fn visible_services(&self) -> Result<Vec<Service>> {
        Ok(self.store.list_services().await?.into_iter().filter(Service::is_visible).collect())
    }

    /// Ids of the category named by `slug` and all its descendants. `None` when no filter applies.
    async fn category_scope(&self, slug: Option<&str>) -> Result<Option<Vec<Uuid>>> {
        let Some(slug) = slug else { return Ok(None) };
        let categories = self.store.list_categories().await?;
        Ok(Some(match categories.iter().find(|c| c.slug == slug) {
            Some(root) => descendant_ids(&categories, root.id),
            None => Vec::new(),
        }))
    }

    pub async fn list_products(&self, query: &CatalogQuery) -> Result<Page<ProductView>> {
        let scope = self.category_scope(query.category.as_deref()).await?;
        let mut products: Vec<Product> = self
            .visible_products()
            .await?
            .into_iter()
            .filter(|p| query.q.as_deref().map_or(true, |q| matches_text(q, &p.name, p.description.as_deref())))
            .filter(|p| scope.as_ref().map_or(true, |ids| p.category_id.is_some_and(|c| ids.contains(&c))))
            .filter(|p| in_price_range(p.current_price(), query))
            .collect();
        sort_items(&mut products, query.sort.unwrap_or(CatalogSort::Newest), |p| p.name.as_str());
        Ok(Page::slice(products, query.page(), query.per_page()).map(ProductView::from))
    }

    pub async fn featured_products(&self, limit: usize) -> Result<Vec<ProductView>> {
        Ok(self
            .visible_products()
            .await?
            .into_iter()
            .filter(|p| p.featured)
            .take(limit)
            .map(ProductView::from)
            .collect())
    }

    pub async fn latest_products(&self, limit: usize) -> Result<Vec<ProductView>> {
        Ok(self.visible_products().await?.into_iter().take(limit).map(ProductView::from).collect())
    }

    pub async fn related_products(&self, product: &Product, limit: usize) -> Result<Vec<ProductView>> {
        let Some(category_id) = product.category_id else { return Ok(Vec::new()) };
        Ok(self
            .visible_products()
            .await?
            .into_iter()
            .filter(|p| p.id != product.id && p.category_id == Some(category_id))
            .take(limit)
            .map(ProductView::from)
            .collect())
    }

    pub async fn product_detail(&self, slug: &str) -> Result<ProductDetail> {
        let product = self
            .store
            .get_product_by_slug(slug)
            .await?
            .filter(Product::is_visible)
            .ok_or(EcommerceError::ProductNotFound)?;
        let reviews = self.reviews.approved_for(product.item_ref()).await?;
        let category = self.category_of(product.category_id).await?;
        let related = self.related_products(&product, 4).await?;
        Ok(ProductDetail {
            average_rating: average_rating(&reviews),
            review_count: reviews.len(),
            reviews,
            category,
            related,
            product: ProductView::from(product),
        })
    }

    async fn category_of(&self, id: Option<Uuid>) -> Result<Option<Category>> {
        let Some(id) = id else { return Ok(None) };
        Ok(self.store.list_categories().await?.into_iter().find(|c| c.id == id))
    }

    pub async fn list_services(&self, query: &CatalogQuery) -> Result<Page<ServiceView>> {
        let scope = self.category_scope(query.category.as_deref()).await?;
        let mut services: Vec<Service> = self
            .visible_services()
            .await?
            .into_iter()
            .filter(|s| query.q.as_deref().map_or(true, |q| matches_text(q, &s.name, s.description.as_deref())))
            .filter(|s| scope.as_ref().map_or(true, |ids| s.category_id.is_some_and(|c| ids.contains(&c))))
            .filter(|s| in_price_range(s.current_price(), query))
            .collect();
        sort_items(&mut services, query.sort.unwrap_or(CatalogSort::Newest), |s| s.name.as_str());
        Ok(Page::slice(services, query.page(), query.per_page()).map(ServiceView::from))
    }

    pub async fn featured_services(&self, limit: usize) -> Result<Vec<ServiceView>> {
        Ok(self
            .visible_services()
            .await?
            .into_iter()
            .filter(|s| s.featured)
            .take(limit)
            .map(ServiceView::from)
            .collect())
    }

    pub async fn service_detail(&self, slug: &str) -> Result<ServiceDetail> {
        let service = self.visible_service(slug).await?;
        let reviews = self.reviews.approved_for(service.item_ref()).await?;
        let category = self.category_of(service.category_id).await?;
        let related = match service.category_id {
            Some(category_id) => self
                .visible_services()
                .await?
                .into_iter()
                .filter(|s| s.id != service.id && s.category_id == Some(category_id))
                .take(4)
                .map(ServiceView::from)
                .collect(),
            None => Vec::new(),
        };
        Ok(ServiceDetail {
            average_rating: average_rating(&reviews),
            review_count: reviews.len(),
            reviews,
            category,
            related,
            service: ServiceView::from(service),
        })
    }

    pub async fn visible_service(&self, slug: &str) -> Result<Service> {
        self.store
            .get_service_by_slug(slug)
            .await?
            .filter(Service::is_visible)
            .ok_or(EcommerceError::ServiceNotFound)
    }

    pub async fn categories(&self, kind: Option<CategoryKind>) -> Result<Vec<Category>> {
        Ok(self
            .store
            .list_categories()
            .await?
            .into_iter()
            .filter(|c| c.active && kind.map_or(true, |k| c.kind.matches(k)))
            .collect())
    }

    pub async fn category_detail(&self, slug: &str) -> Result<CategoryDetail> {
        let categories = self.store.list_categories().await?;
        let category = categories
            .iter()
            .find(|c| c.slug == slug && c.active)
            .cloned()
            .ok_or(EcommerceError::CategoryNotFound)?;
        let children = categories
            .iter()
            .filter(|c| c.parent_id == Some(category.id) && c.active)
            .cloned()
            .collect();
        Ok(CategoryDetail { path: breadcrumb(&categories, category.id), children, category })
    }

    pub async fn search(&self, raw: &str) -> Result<SearchResults> {
        let query = raw.trim();
        let length = query.chars().count();
        if !(3..=100).contains(&length) {
            return Err(EcommerceError::Validation("search query must have between 3 and 100 characters".into()));
        }
        let products = self
            .visible_products()
            .await?
            .into_iter()
            .filter(|p| matches_text(query, &p.name, p.description.as_deref()))
            .take(8)
            .map(ProductView::from)
            .collect();
        let services = self
            .visible_services()
            .await?
            .into_iter()
            .filter(|s| matches_text(query, &s.name, s.description.as_deref()))
            .take(5)
            .map(ServiceView::from)
            .collect();
        Ok(SearchResults { query: query.to_string(), products, services })
    }

    // ---- admin ----

    async fn check_category(&self, category_id: Option<Uuid>) -> Result<()> {
        if let Some(id) = category_id {
            if !self.store.list_categories().await?.iter().any(|c| c.id == id) {
                return Err(EcommerceError::CategoryNotFound);
            }
        }
        Ok(())
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: ProductInput, user: Option<String>) -> Result<ProductView> {
        input.validate()?;
        check_prices(input.price, input.sale_price)?;
        self.check_category(input.category_id).await?;

        let sku = match input.sku.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Sku::new(raw).map_err(|e| EcommerceError::Validation(e.to_string()))?,
            None => Sku::generate(),
        };
        let mut product = Product::create(sku, input.name.trim(), slug_for(input.slug.as_deref(), &input.name)?, input.price);
        product.description = input.description;
        product.sale_price = input.sale_price;
        product.category_id = input.category_id;
        product.stock_quantity = input.stock_quantity.unwrap_or(0);
        product.low_stock_threshold = input.low_stock_threshold.unwrap_or(product.low_stock_threshold);
        product.featured = input.featured;
        product.active = input.active.unwrap_or(true);
        product.image = input.image;
        product.weight = input.weight;
        self.store.insert_product(&product).await?;

        if product.stock_quantity > 0 {
            let opening = StockChange {
                product_id: product.id,
                previous: 0,
                current: product.stock_quantity,
                threshold: product.low_stock_threshold,
            };
            let log = InventoryLog::record(&opening, InventoryChangeKind::Set, Some("initial stock".into())).by_user(user);
            self.store.record_inventory_log(&log).await?;
        }
        info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(ProductView::from(product))
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(&self, id: Uuid, input: ProductInput) -> Result<ProductView> {
        input.validate()?;
        check_prices(input.price, input.sale_price)?;
        self.check_category(input.category_id).await?;
        let mut product = self.store.get_product(id).await?.ok_or(EcommerceError::ProductNotFound)?;
        if product.deleted_at.is_some() {
            return Err(EcommerceError::ProductNotFound);
        }
        if let Some(raw) = input.sku.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            product.sku = Sku::new(raw).map_err(|e| EcommerceError::Validation(e.to_string()))?;
        }
        if let Some(slug) = input.slug.as_deref() {
            product.slug = slug_for(Some(slug), &input.name)?;
        }
        product.name = input.name.trim().to_string();
        product.description = input.description;
        product.price = input.price;
        product.sale_price = input.sale_price;
        product.category_id = input.category_id;
        if let Some(threshold) = input.low_stock_threshold {
            product.low_stock_threshold = threshold;
        }
        product.featured = input.featured;
        product.active = input.active.unwrap_or(product.active);
        product.image = input.image;
        product.weight = input.weight;
        product.touch();
        self.store.update_product(&product).await?;
        Ok(ProductView::from(product))
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        let mut product = self.store.get_product(id).await?.ok_or(EcommerceError::ProductNotFound)?;
        product.soft_delete();
        self.store.update_product(&product).await?;
        info!(product_id = %id, "product deleted");
        Ok(())
    }

    pub async fn toggle_product_featured(&self, id: Uuid) -> Result<ProductView> {
        let mut product = self.store.get_product(id).await?.ok_or(EcommerceError::ProductNotFound)?;
        product.toggle_featured();
        self.store.update_product(&product).await?;
        Ok(ProductView::from(product))
    }

    pub async fn admin_products(&self, query: &CatalogQuery) -> Result<Page<ProductView>> {
        let products: Vec<Product> = self
            .store
            .list_products()
            .await?
            .into_iter()
            .filter(|p| {
                query.q.as_deref().map_or(true, |q| {
                    matches_text(q, &p.name, p.description.as_deref()) || p.sku.as_str().contains(&q.to_uppercase())
                })
            })
            .collect();
        Ok(Page::slice(products, query.page(), query.per_page.unwrap_or(15).clamp(1, MAX_PER_PAGE)).map(ProductView::from))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_service(&self, input: ServiceInput) -> Result<ServiceView> {
        input.validate()?;
        check_prices(input.price, input.sale_price)?;
        self.check_category(input.category_id).await?;
        let mut service = Service::create(
            input.name.trim(),
            slug_for(input.slug.as_deref(), &input.name)?,
            input.price,
            input.duration_minutes,
        );
        service.description = input.description;
        service.sale_price = input.sale_price;
        service.category_id = input.category_id;
        service.featured = input.featured;
        service.active = input.active.unwrap_or(true);
        service.image = input.image;
        self.store.insert_service(&service).await?;
        info!(service_id = %service.id, "service created");
        Ok(ServiceView::from(service))
    }

    #[instrument(skip(self, input))]
    pub async fn update_service(&self, id: Uuid, input: ServiceInput) -> Result<ServiceView> {
        input.validate()?;
        check_prices(input.price, input.sale_price)?;
        self.check_category(input.category_id).await?;
        let mut service = self
            .store
            .get_service(id)
            .await?
            .filter(|s| s.deleted_at.is_none())
            .ok_or(EcommerceError::ServiceNotFound)?;
        if let Some(slug) = input.slug.as_deref() {
            service.slug = slug_for(Some(slug), &input.name)?;
        }
        service.name = input.name.trim().to_string();
        service.description = input.description;
        service.price = input.price;
        service.sale_price = input.sale_price;
        service.duration_minutes = input.duration_minutes;
        service.category_id = input.category_id;
        service.featured = input.featured;
        service.active = input.active.unwrap_or(service.active);
        service.image = input.image;
        service.touch();
        self.store.update_service(&service).await?;
        Ok(ServiceView::from(service))
    }

    #[instrument(skip(self))]
    pub async fn delete_service(&self, id: Uuid) -> Result<()> {
        let mut service = self.store.get_service(id).await?.ok_or(EcommerceError::ServiceNotFound)?;
        service.soft_delete();
        self.store.update_service(&service).await?;
        info!(service_id = %id, "service deleted");
        Ok(())
    }

    pub async fn toggle_service_featured(&self, id: Uuid) -> Result<ServiceView> {
        let mut service = self.store.get_service(id).await?.ok_or(EcommerceError::ServiceNotFound)?;
        service.toggle_featured();
        self.store.update_service(&service).await?;
        Ok(ServiceView::from(service))
    }

    pub async fn admin_services(&self) -> Result<Vec<ServiceView>> {
        Ok(self.store.list_services().await?.into_iter().map(ServiceView::from).collect())
    }

    pub async fn all_categories(&self) -> Result<Vec<Category>> {
        self.store.list_categories().await
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(&self, input: CategoryInput) -> Result<Category> {
        input.validate()?;
        let mut category = Category::create(input.name.trim(), slug_for(input.slug.as_deref(), &input.name)?, input.kind);
        self.apply_category_input(&mut category, input).await?;
        self.store.insert_category(&category).await?;
        Ok(category)
    }

    #[instrument(skip(self, input))]
    pub async fn update_category(&self, id: Uuid, input: CategoryInput) -> Result<Category> {
        input.validate()?;
        let mut category = self
            .store
            .list_categories()
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or(EcommerceError::CategoryNotFound)?;
        category.name = input.name.trim().to_string();
        category.kind = input.kind;
        if let Some(slug) = input.slug.as_deref() {
            category.slug = slug_for(Some(slug), &input.name)?;
        }
        self.apply_category_input(&mut category, input).await?;
        self.store.update_category(&category).await?;
        Ok(category)
    }

    async fn apply_category_input(&self, category: &mut Category, input: CategoryInput) -> Result<()> {
        if let Some(parent_id) = input.parent_id {
            let categories = self.store.list_categories().await?;
            if !categories.iter().any(|c| c.id == parent_id) {
                return Err(EcommerceError::CategoryNotFound);
            }
            if parent_id != category.id && descendant_ids(&categories, category.id).contains(&parent_id) {
                return Err(EcommerceError::Validation("a category cannot be nested under its own child".into()));
            }
        }
        category.set_parent(input.parent_id)?;
        category.description = input.description;
        category.active = input.active.unwrap_or(category.active);
        category.display_order = input.display_order.unwrap_or(category.display_order);
        category.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::events::EventPublisher;
    use crate::store::MemoryStore;

    fn service() -> CatalogService {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let reviews = ReviewService::new(store.clone(), EventPublisher::default());
        CatalogService::new(store, reviews)
    }

    fn product_input(name: &str, price: i64) -> ProductInput {
        ProductInput {
            name: name.into(),
            slug: None,
            sku: None,
            description: None,
            price: Decimal::new(price, 0),
            sale_price: None,
            category_id: None,
            stock_quantity: Some(10),
            low_stock_threshold: None,
            featured: false,
            active: None,
            image: None,
            weight: None,
        }
    }

    fn category_input(name: &str, parent_id: Option<Uuid>) -> CategoryInput {
        CategoryInput {
            name: name.into(),
            slug: None,
            description: None,
            parent_id,
            kind: CategoryKind::Product,
            active: None,
            display_order: None,
        }
    }

    #[tokio::test]
    async fn test_listing_filters_and_sorting() {
        let catalog = service();
        let skincare = catalog.create_category(category_input("Skincare", None)).await.unwrap();
        let serums = catalog.create_category(category_input("Serums", Some(skincare.id))).await.unwrap();

        let mut cream = product_input("Creme Hidratante", 80);
        cream.category_id = Some(skincare.id);
        catalog.create_product(cream, None).await.unwrap();
        let mut serum = product_input("Sérum Facial", 120);
        serum.category_id = Some(serums.id);
        serum.sale_price = Some(Decimal::new(60, 0));
        catalog.create_product(serum, None).await.unwrap();
        catalog.create_product(product_input("Óleo Corporal", 40), None).await.unwrap();

        let query = CatalogQuery {
            category: Some("skincare".into()),
            sort: Some(CatalogSort::PriceAsc),
            ..CatalogQuery::default()
        };
        let page = catalog.list_products(&query).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.data[0].product.slug, "serum-facial");
        assert_eq!(page.data[0].current_price, Decimal::new(60, 0));
        assert_eq!(page.data[0].discount_percentage, 50);

        let query = CatalogQuery { max_price: Some(Decimal::new(50, 0)), ..CatalogQuery::default() };
        assert_eq!(catalog.list_products(&query).await.unwrap().total, 1);

        let query = CatalogQuery { q: Some("SÉRUM".into()), ..CatalogQuery::default() };
        assert_eq!(catalog.list_products(&query).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_deleted_products_disappear() {
        let catalog = service();
        let created = catalog.create_product(product_input("Máscara Argila", 30), None).await.unwrap();
        assert!(created.product.sku.as_str().starts_with("SKU-"));
        catalog.delete_product(created.product.id).await.unwrap();
        assert!(matches!(catalog.product_detail("mascara-argila").await, Err(EcommerceError::ProductNotFound)));
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let catalog = service();
        catalog.create_product(product_input("Tônico", 20), None).await.unwrap();
        let err = catalog.create_product(product_input("Tônico", 25), None).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_sale_price_must_be_lower() {
        let catalog = service();
        let mut input = product_input("Esfoliante", 50);
        input.sale_price = Some(Decimal::new(50, 0));
        assert!(matches!(catalog.create_product(input, None).await, Err(EcommerceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_category_breadcrumb_and_cycles() {
        let catalog = service();
        let root = catalog.create_category(category_input("Corpo", None)).await.unwrap();
        let child = catalog.create_category(category_input("Massagens", Some(root.id))).await.unwrap();
        let detail = catalog.category_detail("massagens").await.unwrap();
        assert_eq!(detail.path, "Corpo > Massagens");
        assert_eq!(catalog.category_detail("corpo").await.unwrap().children.len(), 1);

        let err = catalog.update_category(root.id, category_input("Corpo", Some(child.id))).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_search_bounds() {
        let catalog = service();
        assert!(matches!(catalog.search("ab").await, Err(EcommerceError::Validation(_))));
        catalog.create_product(product_input("Protetor Solar", 60), None).await.unwrap();
        let results = catalog.search("solar").await.unwrap();
        assert_eq!(results.products.len(), 1);
        assert!(results.services.is_empty());
    }
}
