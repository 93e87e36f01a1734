use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartLine, OrderItem, Product, Sellable, Service, User, MAX_LINE_QUANTITY};
use crate::domain::value_objects::{ItemKind, ItemRef, Money};
use crate::error::{EcommerceError, Result};
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct AddToCart {
    pub item: ItemRef,
    pub quantity: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub id: Uuid,
    pub item: ItemRef,
    pub name: String,
    pub image: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub formatted_total: String,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub item_count: u32,
    pub subtotal: Decimal,
    pub formatted_subtotal: String,
    /// Lines were capped to stock or dropped while loading.
    pub adjusted: bool,
}

/// A cart line's item as it currently exists in the catalog.
enum Resolved {
    Product(Product),
    Service(Service),
}

impl Resolved {
    fn name(&self) -> &str {
        match self {
            Resolved::Product(p) => &p.name,
            Resolved::Service(s) => &s.name,
        }
    }

    fn is_visible(&self) -> bool {
        match self {
            Resolved::Product(p) => p.is_visible(),
            Resolved::Service(s) => s.is_visible(),
        }
    }

    fn unit_price(&self) -> Decimal {
        match self {
            Resolved::Product(p) => p.current_price(),
            Resolved::Service(s) => s.current_price(),
        }
    }

    fn image(&self) -> Option<String> {
        match self {
            Resolved::Product(p) => p.image.clone(),
            Resolved::Service(s) => s.image.clone(),
        }
    }

    /// Units on hand; services are unlimited.
    fn stock(&self) -> Option<i32> {
        match self {
            Resolved::Product(p) => Some(p.stock_quantity),
            Resolved::Service(_) => None,
        }
    }

    fn check_stock(&self, quantity: u32) -> Result<()> {
        match self {
            Resolved::Product(p) if !p.has_stock_for(quantity) => Err(EcommerceError::InsufficientStock {
                product_id: p.id,
                requested: quantity,
                available: p.stock_quantity,
            }),
            _ => Ok(()),
        }
    }

    fn snapshot(&self, line: &CartLine) -> OrderItem {
        let sku = match self {
            Resolved::Product(p) => Some(p.sku.as_str().to_string()),
            Resolved::Service(_) => None,
        };
        OrderItem::snapshot(line.item, self.name(), sku, line.quantity, self.unit_price())
    }
}

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn resolve(&self, item: ItemRef) -> Result<Option<Resolved>> {
        Ok(match item.kind {
            ItemKind::Product => self.store.get_product(item.id).await?.map(Resolved::Product),
            ItemKind::Service => self.store.get_service(item.id).await?.map(Resolved::Service),
        })
    }

    async fn resolve_visible(&self, item: ItemRef) -> Result<Resolved> {
        let not_found = match item.kind {
            ItemKind::Product => EcommerceError::ProductNotFound,
            ItemKind::Service => EcommerceError::ServiceNotFound,
        };
        let resolved = self.resolve(item).await?.ok_or(not_found)?;
        if !resolved.is_visible() {
            return Err(EcommerceError::Unavailable(resolved.name().to_string()));
        }
        Ok(resolved)
    }

    /// Loads the cart, capping product lines to stock and dropping lines whose item is gone.
    pub async fn view(&self, user: &User) -> Result<CartView> {
        let mut cart = self.store.load_cart(user.id).await?;
        let mut resolved = Vec::with_capacity(cart.lines().len());
        let mut gone = Vec::new();
        let mut capped = Vec::new();
        for line in cart.lines() {
            match self.resolve(line.item).await? {
                Some(item) if item.is_visible() => match item.stock() {
                    Some(stock) if stock <= 0 => gone.push(line.id),
                    Some(stock) if i64::from(line.quantity) > i64::from(stock) => {
                        capped.push((line.id, u32::try_from(stock).unwrap_or(0)));
                        resolved.push((line.id, item));
                    }
                    _ => resolved.push((line.id, item)),
                },
                _ => gone.push(line.id),
            }
        }

        let adjusted = !gone.is_empty() || !capped.is_empty();
        if adjusted {
            cart.drop_lines(|l| gone.contains(&l.id));
            for (line_id, quantity) in capped {
                cart.update_quantity(line_id, quantity.min(MAX_LINE_QUANTITY))?;
            }
            self.store.save_cart(&cart).await?;
            info!(user_id = %user.id, dropped = gone.len(), "cart adjusted to catalog");
        }

        let mut lines = Vec::with_capacity(resolved.len());
        for (line_id, item) in resolved {
            let line = cart.line(line_id)?;
            let unit_price = item.unit_price();
            let line_total = Money::brl(unit_price).multiply(line.quantity);
            lines.push(CartLineView {
                id: line.id,
                item: line.item,
                name: item.name().to_string(),
                image: item.image(),
                quantity: line.quantity,
                unit_price,
                formatted_total: line_total.format(),
                line_total: line_total.amount(),
            });
        }
        let subtotal: Decimal = lines.iter().map(|l| l.line_total).sum();
        Ok(CartView {
            item_count: lines.iter().map(|l| l.quantity).sum(),
            formatted_subtotal: Money::brl(subtotal).format(),
            subtotal,
            lines,
            adjusted,
        })
    }

    #[instrument(skip(self, user, input), fields(user_id = %user.id, item = %input.item.id))]
    pub async fn add(&self, user: &User, input: AddToCart) -> Result<CartView> {
        let quantity = input.quantity.unwrap_or(1);
        let item = self.resolve_visible(input.item).await?;
        let mut cart = self.store.load_cart(user.id).await?;
        item.check_stock(cart.quantity_of(input.item).saturating_add(quantity))?;
        let merged = cart.add_item(input.item, quantity)?;
        self.store.save_cart(&cart).await?;
        info!(quantity = merged, "added to cart");
        self.view(user).await
    }

    pub async fn update(&self, user: &User, line_id: Uuid, quantity: u32) -> Result<CartView> {
        let mut cart = self.store.load_cart(user.id).await?;
        let item = cart.line(line_id)?.item;
        if quantity > 0 {
            self.resolve_visible(item).await?.check_stock(quantity)?;
        }
        cart.update_quantity(line_id, quantity)?;
        self.store.save_cart(&cart).await?;
        self.view(user).await
    }

    pub async fn remove(&self, user: &User, line_id: Uuid) -> Result<CartView> {
        let mut cart = self.store.load_cart(user.id).await?;
        cart.remove_line(line_id)?;
        self.store.save_cart(&cart).await?;
        self.view(user).await
    }

    pub async fn clear(&self, user: &User) -> Result<()> {
        let mut cart = self.store.load_cart(user.id).await?;
        cart.clear();
        self.store.save_cart(&cart).await
    }

    pub(crate) async fn load(&self, user_id: Uuid) -> Result<Cart> {
        self.store.load_cart(user_id).await
    }

    /// Re-validates every line and snapshots it for an order.
    pub(crate) async fn order_items(&self, cart: &Cart) -> Result<Vec<OrderItem>> {
        if cart.is_empty() {
            return Err(EcommerceError::CartEmpty);
        }
        let mut items = Vec::with_capacity(cart.lines().len());
        for line in cart.lines() {
            let item = self.resolve_visible(line.item).await?;
            item.check_stock(line.quantity)?;
            items.push(item.snapshot(line));
        }
        Ok(items)
    }
}
