//! Turns a cart into a placed, paid-for order.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use validator::Validate;

use crate::domain::aggregates::{Address, GatewayStatus, Order, OrderStatus, Payment, PaymentMethod, User};
use crate::error::Result;
use crate::services::cart::CartService;
use crate::services::events::EventPublisher;
use crate::services::payments::{PaymentDetails, PaymentService};
use crate::store::Store;

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate]
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment: PaymentDetails,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub payment: Payment,
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn Store>,
    cart: CartService,
    payments: PaymentService,
    events: EventPublisher,
    shipping_fee: Decimal,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn Store>,
        cart: CartService,
        payments: PaymentService,
        events: EventPublisher,
        shipping_fee: Decimal,
    ) -> Self {
        Self { store, cart, payments, events, shipping_fee }
    }

    #[instrument(skip(self, customer, request), fields(user_id = %customer.id, method = %request.payment_method))]
    pub async fn checkout(&self, customer: &User, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        request.validate()?;
        request.payment.validate_for(request.payment_method)?;

        let mut cart = self.cart.load(customer.id).await?;
        let items = self.cart.order_items(&cart).await?;
        let mut address = request.shipping_address;
        address.state = address.state.to_uppercase();
        let mut order = Order::place(customer, address, request.payment_method, items, self.shipping_fee)?;
        order.notes = request.notes;
        order.stock_reserved = order.has_physical_items();

        let changes = self.store.insert_order(&order, &order.reservation_moves()).await?;
        info!(order_id = %order.id, order_number = %order.order_number, total = %order.total, "order placed");
        self.events.publish_all(order.take_events()).await;
        self.events.stock_changes(&changes).await;

        let payment = match self.payments.charge(&order, request.payment).await {
            Ok(payment) => payment,
            Err(e) => {
                error!(order_id = %order.id, error = %e, "payment creation failed");
                self.abandon(&mut order).await;
                return Err(e);
            }
        };

        if payment.status.is_awaiting() || payment.status == GatewayStatus::Approved {
            cart.clear();
            self.store.save_cart(&cart).await?;
        }

        let order = self.store.get_order(order.id).await?.unwrap_or(order);
        Ok(CheckoutReceipt { order, payment })
    }

    /// Gives reserved stock back after the gateway refused to create a payment.
    async fn abandon(&self, order: &mut Order) {
        let expected = order.version();
        let transition = match order.transition_to(OrderStatus::PaymentFailed) {
            Ok(t) => t,
            Err(e) => {
                error!(order_id = %order.id, error = %e, "could not mark order as failed");
                return;
            }
        };
        let moves = if transition.releases_stock() { order.release_moves() } else { vec![] };
        match self.store.save_order(order, expected, &moves).await {
            Ok(_) => self.events.publish_all(order.take_events()).await,
            Err(e) => error!(order_id = %order.id, error = %e, "could not release stock for failed order"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{InventoryChangeKind, PaymentStatus, Product, Role, Service};
    use crate::domain::events::DomainEvent;
    use crate::domain::value_objects::{ItemRef, Sku};
    use crate::error::EcommerceError;
    use crate::services::cart::AddToCart;
    use crate::services::payments::testing::ScriptedGateway;
    use crate::store::MemoryStore;

    struct Fixture {
        store: Arc<dyn Store>,
        events: EventPublisher,
        cart: CartService,
        checkout: CheckoutService,
        customer: User,
        product: Product,
        service: Service,
    }

    async fn fixture(gateway: ScriptedGateway) -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let customer = User::register("Rosa", "rosa@example.com", Role::Customer);
        store.insert_user(&customer).await.unwrap();
        let mut product = Product::create(Sku::new("MAS-1").unwrap(), "Máscara Facial", "mascara-facial", Decimal::new(5000, 2));
        product.stock_quantity = 6;
        store.insert_product(&product).await.unwrap();
        let service = Service::create("Drenagem", "drenagem", Decimal::new(150, 0), 50);
        store.insert_service(&service).await.unwrap();

        let events = EventPublisher::recording();
        let cart = CartService::new(store.clone());
        let payments = PaymentService::new(store.clone(), Arc::new(gateway), events.clone());
        let checkout =
            CheckoutService::new(store.clone(), cart.clone(), payments, events.clone(), Decimal::new(1500, 2));
        Fixture { store, events, cart, checkout, customer, product, service }
    }

    fn request(method: PaymentMethod) -> CheckoutRequest {
        CheckoutRequest {
            shipping_address: Address {
                street: "Rua XV de Novembro".into(),
                number: "55".into(),
                complement: Some("ap 12".into()),
                neighborhood: "Centro".into(),
                city: "Curitiba".into(),
                state: "pr".into(),
                zip_code: "80020-310".into(),
            },
            payment_method: method,
            payment: PaymentDetails::default(),
            notes: None,
        }
    }

    async fn add(f: &Fixture, item: ItemRef, quantity: u32) {
        f.cart.add(&f.customer, AddToCart { item, quantity: Some(quantity) }).await.unwrap();
    }

    async fn stock(f: &Fixture) -> i32 {
        f.store.get_product(f.product.id).await.unwrap().unwrap().stock_quantity
    }

    #[tokio::test]
    async fn test_checkout_reserves_stock_and_clears_cart() {
        let f = fixture(ScriptedGateway::answering(GatewayStatus::Pending)).await;
        add(&f, f.product.item_ref(), 2).await;
        add(&f, f.service.item_ref(), 1).await;

        let receipt = f.checkout.checkout(&f.customer, request(PaymentMethod::Pix)).await.unwrap();
        assert_eq!(receipt.order.subtotal, Decimal::new(250, 0));
        assert_eq!(receipt.order.shipping, Decimal::new(1500, 2));
        assert_eq!(receipt.order.total, Decimal::new(26500, 2));
        assert_eq!(receipt.order.shipping_address.state, "PR");
        assert_eq!(receipt.order.status, OrderStatus::Pending);
        assert_eq!(receipt.payment.pix_qr_code.as_deref(), Some("pix-qr"));
        assert_eq!(stock(&f).await, 4);

        let logs = f.store.inventory_logs(f.product.id, 10).await.unwrap();
        assert!(logs.iter().any(|l| l.kind == InventoryChangeKind::Reservation && l.order_id == Some(receipt.order.id)));
        assert!(f.cart.view(&f.customer).await.unwrap().lines.is_empty());
        assert!(f.events.recorded().iter().any(|e| matches!(e, DomainEvent::OrderPlaced { .. })));
    }

    #[tokio::test]
    async fn test_immediate_approval_returns_processing_order() {
        let f = fixture(ScriptedGateway::answering(GatewayStatus::Approved)).await;
        add(&f, f.product.item_ref(), 1).await;
        let receipt = f.checkout.checkout(&f.customer, request(PaymentMethod::Pix)).await.unwrap();
        assert_eq!(receipt.order.status, OrderStatus::Processing);
        assert_eq!(receipt.order.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_gateway_failure_releases_stock_and_keeps_cart() {
        let f = fixture(ScriptedGateway::failing("gateway offline")).await;
        add(&f, f.product.item_ref(), 3).await;

        let err = f.checkout.checkout(&f.customer, request(PaymentMethod::Pix)).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Gateway(_)));
        assert_eq!(stock(&f).await, 6);
        assert_eq!(f.cart.view(&f.customer).await.unwrap().lines.len(), 1);

        let orders = f.store.list_orders(&crate::store::OrderFilter::for_user(f.customer.id)).await.unwrap();
        assert_eq!(orders[0].status, OrderStatus::PaymentFailed);
        assert!(!orders[0].stock_reserved);
    }

    #[tokio::test]
    async fn test_declined_payment_keeps_cart() {
        let f = fixture(ScriptedGateway::answering(GatewayStatus::Failed)).await;
        add(&f, f.product.item_ref(), 2).await;
        let receipt = f.checkout.checkout(&f.customer, request(PaymentMethod::Pix)).await.unwrap();
        assert_eq!(receipt.order.status, OrderStatus::PaymentFailed);
        assert_eq!(receipt.payment.status, GatewayStatus::Failed);
        assert_eq!(stock(&f).await, 6);
        assert_eq!(f.cart.view(&f.customer).await.unwrap().lines.len(), 1);
    }

    #[tokio::test]
    async fn test_service_only_order_has_no_shipping() {
        let f = fixture(ScriptedGateway::answering(GatewayStatus::Pending)).await;
        add(&f, f.service.item_ref(), 1).await;
        let receipt = f.checkout.checkout(&f.customer, request(PaymentMethod::Pix)).await.unwrap();
        assert_eq!(receipt.order.shipping, Decimal::ZERO);
        assert!(!receipt.order.stock_reserved);
    }

    #[tokio::test]
    async fn test_boleto_requires_document() {
        let f = fixture(ScriptedGateway::default()).await;
        add(&f, f.product.item_ref(), 1).await;
        let err = f.checkout.checkout(&f.customer, request(PaymentMethod::Boleto)).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Validation(_)));
        assert_eq!(stock(&f).await, 6);
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let f = fixture(ScriptedGateway::default()).await;
        let err = f.checkout.checkout(&f.customer, request(PaymentMethod::Pix)).await.unwrap_err();
        assert!(matches!(err, EcommerceError::CartEmpty));
    }
}
