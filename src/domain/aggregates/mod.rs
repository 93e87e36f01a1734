//! Aggregates module
pub mod appointment;
pub mod cart;
pub mod category;
pub mod customer;
pub mod inventory;
pub mod order;
pub mod payment;
pub mod product;
pub mod review;
pub mod service;

pub use appointment::{Appointment, AppointmentStatus};
pub use cart::{Cart, CartLine, MAX_LINE_QUANTITY};
pub use category::{Category, CategoryKind};
pub use customer::{Role, User};
pub use inventory::{
    AdjustedStock, Adjustment, InventoryChangeKind, InventoryLog, StockChange, StockMove, StockStatus,
};
pub use order::{Address, Order, OrderItem, OrderStatus, OrderVersion, PaymentStatus, Transition};
pub use payment::{GatewayStatus, Payment, PaymentMethod};
pub use product::{Product, Sellable};
pub use review::{Review, ReviewStatus};
pub use service::Service;
