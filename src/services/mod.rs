//! Application services. Each one owns a slice of the storefront and talks
//! to persistence through [`crate::store::Store`].

pub mod bookings;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod customers;
pub mod events;
pub mod instagram;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod reports;
pub mod reviews;

pub use bookings::BookingService;
pub use cart::CartService;
pub use catalog::CatalogService;
pub use checkout::CheckoutService;
pub use customers::CustomerService;
pub use events::EventPublisher;
pub use instagram::InstagramClient;
pub use inventory::InventoryService;
pub use orders::OrderService;
pub use payments::PaymentService;
pub use reports::ReportService;
pub use reviews::ReviewService;
