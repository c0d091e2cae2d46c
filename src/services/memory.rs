//! In-memory inventory authority and order service.
//!
//! Backs the demo service and the test suite. Stock, carts and orders live behind a
//! single `RwLock`; failure switches let tests exercise the error branches.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;
use super::ports::{AuthorityError, InventoryAuthority, OrderOutcome, OrderService, SessionContext, StockCheck};
use crate::{Cart, CartId, CartLine, Item, ItemId, LineId, OrderRef};

#[derive(Debug, Default)]
struct MemoryState {
    catalog: BTreeMap<ItemId, Item>,
    sessions: HashMap<String, String>,
    carts: HashMap<String, Cart>,
    orders: HashMap<String, Vec<OrderRef>>,
    snapshots: Vec<Vec<CartLine>>,
    stock_checks: usize,
    next_order: u64,
    fail_load: bool,
    fail_save: bool,
    fail_remove: bool,
}

impl MemoryState {
    fn subject(&self, session: &SessionContext) -> Result<String, AuthorityError> {
        session.token.as_ref().and_then(|t| self.sessions.get(t)).cloned().ok_or(AuthorityError::Unauthorized)
    }

    /// Carts carry item snapshots; refresh them from the catalog the way the server populates them.
    fn refreshed_cart(&self, subject: &str) -> Cart {
        let mut cart = self.carts.get(subject).cloned().unwrap_or_else(|| Cart::new(subject));
        for line in &mut cart.lines {
            if let Some(item) = self.catalog.get(&line.item.id) { line.item = item.clone(); }
        }
        cart
    }
}

#[derive(Default)]
pub struct InMemoryBackendBuilder {
    state: MemoryState,
}

impl InMemoryBackendBuilder {
    pub fn item(mut self, item: Item) -> Self {
        self.state.catalog.insert(item.id.clone(), item);
        self
    }

    pub fn session(mut self, token: impl Into<String>, subject: impl Into<String>) -> Self {
        self.state.sessions.insert(token.into(), subject.into());
        self
    }

    pub fn build(self) -> InMemoryBackend {
        InMemoryBackend { state: Arc::new(RwLock::new(self.state)) }
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryBackend {
    pub fn builder() -> InMemoryBackendBuilder { InMemoryBackendBuilder::default() }

    pub async fn catalog(&self) -> Vec<Item> { self.state.read().await.catalog.values().cloned().collect() }

    pub async fn item(&self, id: &ItemId) -> Option<Item> { self.state.read().await.catalog.get(id).cloned() }

    /// Out-of-band stock change, e.g. another shopper checking out.
    pub async fn set_stock(&self, id: &ItemId, stock: i64) {
        if let Some(item) = self.state.write().await.catalog.get_mut(id) { item.stock_quantity = stock; }
    }

    pub async fn fail_loads(&self, fail: bool) { self.state.write().await.fail_load = fail; }
    pub async fn fail_saves(&self, fail: bool) { self.state.write().await.fail_save = fail; }
    pub async fn fail_removes(&self, fail: bool) { self.state.write().await.fail_remove = fail; }

    pub async fn snapshots(&self) -> Vec<Vec<CartLine>> { self.state.read().await.snapshots.clone() }
    pub async fn stock_checks(&self) -> usize { self.state.read().await.stock_checks }
}

#[async_trait]
impl InventoryAuthority for InMemoryBackend {
    async fn is_authenticated(&self, session: &SessionContext) -> bool {
        self.state.read().await.subject(session).is_ok()
    }

    async fn get_cart(&self, session: &SessionContext) -> Result<Cart, AuthorityError> {
        let state = self.state.read().await;
        let subject = state.subject(session)?;
        if state.fail_load { return Err(AuthorityError::Unavailable("cart store offline".into())); }
        Ok(state.refreshed_cart(&subject))
    }

    async fn add_line(&self, session: &SessionContext, item_id: &ItemId, quantity: u32) -> Result<Cart, AuthorityError> {
        let mut state = self.state.write().await;
        let subject = state.subject(session)?;
        let item = state.catalog.get(item_id).cloned().ok_or_else(|| AuthorityError::NotFound(item_id.to_string()))?;
        if quantity == 0 { return Err(AuthorityError::Rejected("Invalid quantity".into())); }

        let mut cart = state.refreshed_cart(&subject);
        let existing = cart.lines.iter().find(|l| l.item.id == *item_id).map(|l| l.quantity).unwrap_or(0);
        let wanted = existing.saturating_add(quantity);
        if i64::from(wanted) > item.stock_quantity {
            return Err(AuthorityError::Rejected(format!("Only {} items are available in stock.", item.stock_quantity.max(0))));
        }
        match cart.lines.iter_mut().find(|l| l.item.id == *item_id) {
            Some(line) => line.quantity = wanted,
            None => cart.lines.push(CartLine { id: LineId::generate(), item, quantity }),
        }
        cart.updated_at = Utc::now();
        state.carts.insert(subject, cart.clone());
        Ok(cart)
    }

    async fn update_line_quantity(&self, session: &SessionContext, line_id: &LineId, quantity: u32) -> Result<StockCheck, AuthorityError> {
        let mut state = self.state.write().await;
        let subject = state.subject(session)?;
        state.stock_checks += 1;
        let item_id = state.carts.get(&subject)
            .and_then(|c| c.line(line_id))
            .map(|l| l.item.id.clone())
            .ok_or_else(|| AuthorityError::NotFound(line_id.to_string()))?;
        let available = state.catalog.get(&item_id).map(|i| i.stock_quantity).unwrap_or(0);

        if available > 0 && i64::from(quantity) <= available {
            if let Some(line) = state.carts.get_mut(&subject).and_then(|c| c.line_mut(line_id)) { line.quantity = quantity; }
            return Ok(StockCheck { accepted: true, available_stock: available, message: "Requested quantity is available".into() });
        }
        Ok(StockCheck { accepted: false, available_stock: available, message: "Insufficient stock".into() })
    }

    async fn remove_line(&self, session: &SessionContext, line_id: &LineId) -> Result<(), AuthorityError> {
        let mut state = self.state.write().await;
        let subject = state.subject(session)?;
        if state.fail_remove { return Err(AuthorityError::Unavailable("cart store offline".into())); }
        let removed = state.carts.get_mut(&subject).map(|c| c.remove_line(line_id)).unwrap_or(false);
        if !removed { return Err(AuthorityError::NotFound(line_id.to_string())); }
        Ok(())
    }

    async fn save_cart_snapshot(&self, session: &SessionContext, lines: &[CartLine]) -> Result<(), AuthorityError> {
        let mut state = self.state.write().await;
        let subject = state.subject(session)?;
        if state.fail_save { return Err(AuthorityError::Unavailable("cart store offline".into())); }
        state.snapshots.push(lines.to_vec());
        let cart = state.carts.entry(subject.clone()).or_insert_with(|| Cart::new(subject));
        cart.lines = lines.to_vec();
        cart.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl OrderService for InMemoryBackend {
    async fn create_order(&self, session: &SessionContext, cart_id: &CartId) -> Result<OrderOutcome, AuthorityError> {
        let mut state = self.state.write().await;
        let subject = state.subject(session)?;
        let cart = state.refreshed_cart(&subject);
        if &cart.id != cart_id { return Err(AuthorityError::NotFound(cart_id.to_string())); }
        if cart.is_empty() { return Err(AuthorityError::Rejected("Cart is empty".into())); }

        if let Some(short) = cart.lines.iter().find(|l| i64::from(l.quantity) > l.item.stock_quantity) {
            return Ok(OrderOutcome::StockConflict(format!("Insufficient stock for {}", short.item.name)));
        }
        for line in &cart.lines {
            if let Some(item) = state.catalog.get_mut(&line.item.id) { item.stock_quantity -= i64::from(line.quantity); }
        }

        state.next_order += 1;
        let order = OrderRef {
            id: Uuid::now_v7().to_string(),
            order_number: format!("ORD-{:08}", state.next_order),
            cart_id: cart.id.clone(),
            lines: cart.lines.clone(),
            created_at: Utc::now(),
        };
        if let Some(stored) = state.carts.get_mut(&subject) { stored.lines.clear(); }
        state.orders.entry(subject).or_default().push(order.clone());
        Ok(OrderOutcome::Placed(order))
    }

    async fn list_orders(&self, session: &SessionContext) -> Result<Vec<OrderRef>, AuthorityError> {
        let state = self.state.read().await;
        let subject = state.subject(session)?;
        Ok(state.orders.get(&subject).cloned().unwrap_or_default())
    }
}
