//! Collaborator contracts the cart engine consumes.
//!
//! Adapters (HTTP clients, the in-memory backend) implement these traits. The engine
//! only ever talks to them through `Arc<dyn ...>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::{Cart, CartId, CartLine, ItemId, LineId, OrderRef};

/// Explicit session handed to the engine in place of ambient token storage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub token: Option<String>,
    pub device_id: String,
}

impl SessionContext {
    pub fn new(token: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self { token: Some(token.into()), device_id: device_id.into() }
    }
    pub fn anonymous(device_id: impl Into<String>) -> Self { Self { token: None, device_id: device_id.into() } }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthorityError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Rejected(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Live stock answer for a requested line quantity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockCheck {
    pub accepted: bool,
    pub available_stock: i64,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderOutcome {
    Placed(OrderRef),
    /// Stock moved between the gate check and order creation.
    StockConflict(String),
}

#[async_trait]
pub trait InventoryAuthority: Send + Sync {
    async fn is_authenticated(&self, session: &SessionContext) -> bool;
    async fn get_cart(&self, session: &SessionContext) -> Result<Cart, AuthorityError>;
    async fn add_line(&self, session: &SessionContext, item_id: &ItemId, quantity: u32) -> Result<Cart, AuthorityError>;
    async fn update_line_quantity(&self, session: &SessionContext, line_id: &LineId, quantity: u32) -> Result<StockCheck, AuthorityError>;
    async fn remove_line(&self, session: &SessionContext, line_id: &LineId) -> Result<(), AuthorityError>;
    async fn save_cart_snapshot(&self, session: &SessionContext, lines: &[CartLine]) -> Result<(), AuthorityError>;
}

#[async_trait]
pub trait OrderService: Send + Sync {
    async fn create_order(&self, session: &SessionContext, cart_id: &CartId) -> Result<OrderOutcome, AuthorityError>;
    async fn list_orders(&self, session: &SessionContext) -> Result<Vec<OrderRef>, AuthorityError>;
}
