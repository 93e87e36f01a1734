use std::sync::Arc;

use crate::config::Config;
use crate::services::payments::{PaymentGateway, WebhookVerifier};
use crate::services::{
    BookingService, CartService, CatalogService, CheckoutService, CustomerService, EventPublisher, InstagramClient,
    InventoryService, OrderService, PaymentService, ReportService, ReviewService,
};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: CatalogService,
    pub customers: CustomerService,
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub inventory: InventoryService,
    pub reviews: ReviewService,
    pub bookings: BookingService,
    pub reports: ReportService,
    pub instagram: InstagramClient,
    pub webhooks: WebhookVerifier,
}

impl AppState {
    /// Wires every service over one store, gateway and event publisher.
    pub fn new(config: Config, store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, events: EventPublisher) -> Self {
        let reviews = ReviewService::new(store.clone(), events.clone());
        let cart = CartService::new(store.clone());
        let payments = PaymentService::new(store.clone(), gateway, events.clone());
        let threshold = config.shop.low_stock_threshold;

        Self {
            catalog: CatalogService::new(store.clone(), reviews.clone()),
            customers: CustomerService::new(store.clone()),
            checkout: CheckoutService::new(
                store.clone(),
                cart.clone(),
                payments.clone(),
                events.clone(),
                config.shop.shipping_flat_fee,
            ),
            orders: OrderService::new(store.clone(), payments.clone(), events.clone()),
            inventory: InventoryService::new(store.clone(), events.clone(), threshold),
            bookings: BookingService::new(store.clone(), events),
            reports: ReportService::new(store, threshold),
            instagram: InstagramClient::new(&config.instagram),
            webhooks: WebhookVerifier::new(config.payment.webhook_secret.clone(), !config.is_local()),
            reviews,
            cart,
            payments,
            config: Arc::new(config),
        }
    }
}
