//! OpenSASE Cart
//!
//! Client-side cart reconciliation against a remote inventory authority.
//!
//! ## Features
//! - Stock clamping and quantity option enumeration
//! - Per-line quantity validation (dropdown and custom entry paths)
//! - Live stock round trips with per-line state tracking
//! - Order totals over eligible lines only
//! - Checkout gating with snapshot-and-submit

pub mod api;
pub mod config;
pub mod domain;
pub mod services;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use domain::value_objects::{CartId, ItemId, LineId};

// =============================================================================
// Core Types
// =============================================================================

/// Catalog item as reported by the inventory authority.
///
/// `stock_quantity` is the raw upstream figure and may be negative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub price: Decimal,
    pub stock_quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: LineId,
    pub item: Item,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner: String,
    pub lines: Vec<CartLine>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(owner: impl Into<String>) -> Self {
        Self { id: CartId::generate(), owner: owner.into(), lines: vec![], updated_at: Utc::now() }
    }

    pub fn line(&self, id: &LineId) -> Option<&CartLine> { self.lines.iter().find(|l| &l.id == id) }
    pub fn line_mut(&mut self, id: &LineId) -> Option<&mut CartLine> { self.lines.iter_mut().find(|l| &l.id == id) }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    pub fn remove_line(&mut self, id: &LineId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| &l.id != id);
        self.lines.len() != before
    }
}

/// Reference to an order created from a cart snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRef {
    pub id: String,
    pub order_number: String,
    pub cart_id: CartId,
    pub lines: Vec<CartLine>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CartError {
    #[error("Please log in to continue")]
    NotAuthenticated,

    #[error("Failed to load cart items: {0}")]
    Load(String),

    #[error("Your change may not have been saved: {0}")]
    Persistence(String),

    #[error("{0}")]
    SubmissionConflict(String),

    #[error("{0}")]
    CheckoutBlocked(String),

    #[error("Line not found: {0}")]
    LineNotFound(LineId),

    #[error("A quantity update is already pending for line {0}")]
    LineBusy(LineId),

    #[error("No item is staged for removal")]
    NoStagedRemoval,

    #[error("{0}")]
    InvalidSelection(String),

    #[error("Inventory authority error: {0}")]
    Authority(String),
}

pub type Result<T> = std::result::Result<T, CartError>;
