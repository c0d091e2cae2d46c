//! Stock policy and line validation. Everything here is pure and synchronous.

pub mod stock;
pub mod validator;

pub use stock::{display_stock, legal_quantity_range, quantity_options, QuantityOptions, CUSTOM_QUANTITY_FLOOR, MAX_DROPDOWN_QUANTITY};
pub use validator::{validate, EntryPath, QuantityInput, Verdict};
