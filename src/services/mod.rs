//! Application services: the reconciler, the checkout gate and the collaborators they drive.
pub mod checkout;
pub mod memory;
pub mod ports;
pub mod reconciler;

pub use checkout::{CheckoutGate, PlacedOrder};
pub use memory::InMemoryBackend;
pub use ports::{AuthorityError, InventoryAuthority, OrderOutcome, OrderService, SessionContext, StockCheck};
pub use reconciler::{CartReconciler, CartSnapshot, CartView, LineView, QuantityOutcome};
