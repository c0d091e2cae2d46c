//! Cart reconciliation against the inventory authority.
//!
//! One reconciler owns one session's cart. Local state sits behind a mutex that is
//! released before every collaborator call, so round trips for different lines can
//! interleave. A line with a round trip in flight is `Pending` and refuses a second
//! change until the first one settles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use crate::domain::aggregates::{displayed_quantity, is_line_eligible, ItemSelection, LineError, LineErrorMap, LineState, LineStates};
use crate::domain::events::{CartEvent, Notification};
use crate::domain::policy::{display_stock, quantity_options, validate, EntryPath, QuantityInput, Verdict, CUSTOM_QUANTITY_FLOOR, MAX_DROPDOWN_QUANTITY};
use crate::domain::value_objects::QuantityOption;
use super::ports::{InventoryAuthority, SessionContext};
use crate::{Cart, CartError, CartLine, LineId, Result};

const LOAD_FAILED: &str = "Failed to load cart items. Please try again later.";

/// Result of a quantity change request for one line.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum QuantityOutcome {
    Committed(u32),
    OutOfStock,
    ExceedsStock { available: u32 },
    /// Rejected locally; no round trip was made.
    Rejected(LineError),
    /// The line was removed or reloaded while the round trip was in flight.
    Stale,
}

#[derive(Debug, Default)]
struct ReconcilerState {
    cart: Option<Cart>,
    states: LineStates,
    custom_quantities: HashMap<LineId, String>,
    load_error: Option<String>,
    notification: Option<Notification>,
    staged_removal: Option<LineId>,
    next_ticket: u64,
    events: Vec<CartEvent>,
}

impl ReconcilerState {
    fn line(&self, id: &LineId) -> Result<&CartLine> {
        self.cart.as_ref().and_then(|c| c.line(id)).ok_or_else(|| CartError::LineNotFound(id.clone()))
    }

    fn notify(&mut self, notification: Notification) { self.notification = Some(notification); }

    fn reject(&mut self, id: &LineId, error: LineError) {
        self.events.push(CartEvent::LineRejected { line_id: id.clone(), kind: error.kind.clone() });
        self.states.set(id.clone(), LineState::Invalid(error));
    }

    /// Custom working values exist for every line past the dropdown range.
    fn seed_custom_quantities(&mut self) {
        self.custom_quantities.clear();
        if let Some(cart) = &self.cart {
            for line in cart.lines.iter().filter(|l| l.quantity > MAX_DROPDOWN_QUANTITY) {
                self.custom_quantities.insert(line.id.clone(), line.quantity.to_string());
            }
        }
    }
}

/// Cart and line states at one instant. Pricing and checkout derive from this.
#[derive(Clone, Debug, PartialEq)]
pub struct CartSnapshot {
    pub cart: Option<Cart>,
    pub states: LineStates,
}

#[derive(Clone, Debug, Serialize)]
pub struct LineView {
    pub line: CartLine,
    pub display_stock: u32,
    pub displayed_quantity: u32,
    pub options: Vec<QuantityOption>,
    pub custom_quantity: Option<String>,
    pub state: LineState,
    pub eligible: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartView {
    pub lines: Vec<LineView>,
    pub errors: LineErrorMap,
    pub notification: Option<Notification>,
    pub load_error: Option<String>,
    pub staged_removal: Option<LineId>,
}

pub struct CartReconciler {
    authority: Arc<dyn InventoryAuthority>,
    session: SessionContext,
    inner: Mutex<ReconcilerState>,
    checkout_in_flight: AtomicBool,
}

/// Marks a checkout as running on one reconciler; released on drop, including cancellation.
pub(crate) struct CheckoutGuard<'a>(&'a AtomicBool);

impl Drop for CheckoutGuard<'_> {
    fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

impl CartReconciler {
    pub fn new(authority: Arc<dyn InventoryAuthority>, session: SessionContext) -> Self {
        Self { authority, session, inner: Mutex::new(ReconcilerState::default()), checkout_in_flight: AtomicBool::new(false) }
    }

    pub fn session(&self) -> &SessionContext { &self.session }

    pub(crate) async fn ensure_authenticated(&self) -> Result<()> {
        if self.authority.is_authenticated(&self.session).await { return Ok(()); }
        warn!(device_id = %self.session.device_id, "rejecting cart operation for unauthenticated session");
        self.inner.lock().await.notify(Notification::error(CartError::NotAuthenticated.to_string()));
        Err(CartError::NotAuthenticated)
    }

    pub async fn fetch_cart(&self) -> Result<Cart> {
        self.ensure_authenticated().await?;
        let fetched = self.authority.get_cart(&self.session).await;
        let mut st = self.inner.lock().await;
        st.states.clear();
        st.staged_removal = None;
        match fetched {
            Ok(cart) => {
                info!(cart_id = %cart.id, lines = cart.lines.len(), "cart loaded");
                st.events.push(CartEvent::Loaded { cart_id: cart.id.clone(), lines: cart.lines.len() });
                st.cart = Some(cart.clone());
                st.load_error = None;
                st.seed_custom_quantities();
                Ok(cart)
            }
            Err(e) => {
                warn!(error = %e, "cart load failed");
                st.cart = None;
                st.custom_quantities.clear();
                st.load_error = Some(LOAD_FAILED.to_string());
                st.notify(Notification::error(LOAD_FAILED));
                Err(CartError::Load(e.to_string()))
            }
        }
    }

    /// Adds the selected quantity through the authority and adopts the cart it returns.
    pub async fn add_selection(&self, selection: &ItemSelection) -> Result<Cart> {
        self.ensure_authenticated().await?;
        if !selection.is_valid() {
            let message = "Please select a valid quantity.";
            self.inner.lock().await.notify(Notification::error(message));
            return Err(CartError::InvalidSelection(message.to_string()));
        }
        let item = selection.item();
        let quantity = selection.quantity();
        let added = self.authority.add_line(&self.session, &item.id, quantity).await;

        let mut st = self.inner.lock().await;
        match added {
            Ok(cart) => {
                info!(item_id = %item.id, quantity, "item added to cart");
                if let Some(line) = cart.lines.iter().find(|l| l.item.id == item.id) {
                    st.events.push(CartEvent::ItemAdded { line_id: line.id.clone(), quantity });
                }
                let previous = std::mem::take(&mut st.states);
                for line in &cart.lines {
                    let state = if line.item.id == item.id { LineState::Idle } else { previous.get(&line.id).clone() };
                    st.states.set(line.id.clone(), state);
                }
                st.cart = Some(cart.clone());
                st.load_error = None;
                st.seed_custom_quantities();
                st.notify(Notification::success(format!("{} {}(s) added to cart!", quantity, item.name)));
                Ok(cart)
            }
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "add to cart failed");
                st.notify(Notification::error(e.to_string()));
                Err(CartError::Authority(e.to_string()))
            }
        }
    }

    /// Dropdown entry point. `Custom` seeds the free-form field with 11 and checks that.
    pub async fn select_quantity(&self, line_id: &LineId, option: QuantityOption) -> Result<QuantityOutcome> {
        let quantity = {
            let mut st = self.inner.lock().await;
            st.line(line_id)?;
            if st.states.get(line_id).is_pending() { return Err(CartError::LineBusy(line_id.clone())); }
            match option {
                QuantityOption::Exact(n) => { st.custom_quantities.remove(line_id); n }
                QuantityOption::Custom => {
                    st.custom_quantities.insert(line_id.clone(), CUSTOM_QUANTITY_FLOOR.to_string());
                    CUSTOM_QUANTITY_FLOOR
                }
            }
        };
        self.change_quantity(line_id, quantity).await
    }

    /// Local validation on the custom path; only a valid value reaches the authority.
    pub async fn change_custom_quantity(&self, line_id: &LineId, text: &str) -> Result<QuantityOutcome> {
        let quantity = {
            let mut st = self.inner.lock().await;
            let stock = display_stock(st.line(line_id)?.item.stock_quantity);
            if st.states.get(line_id).is_pending() { return Err(CartError::LineBusy(line_id.clone())); }
            st.custom_quantities.insert(line_id.clone(), text.to_string());
            match validate(QuantityInput::Text(text), stock, EntryPath::Custom) {
                Verdict::Valid(n) => n,
                Verdict::Invalid(error) => {
                    debug!(line_id = %line_id, text, kind = ?error.kind, "custom quantity rejected locally");
                    st.reject(line_id, error.clone());
                    return Ok(QuantityOutcome::Rejected(error));
                }
            }
        };
        self.change_quantity(line_id, quantity).await
    }

    /// Checks `quantity` against live stock. The cached stock figure is never trusted here.
    pub async fn change_quantity(&self, line_id: &LineId, quantity: u32) -> Result<QuantityOutcome> {
        self.ensure_authenticated().await?;
        let (ticket, prior) = {
            let mut st = self.inner.lock().await;
            let stock = display_stock(st.line(line_id)?.item.stock_quantity);
            let prior = st.states.get(line_id).clone();
            if prior.is_pending() { return Err(CartError::LineBusy(line_id.clone())); }
            if quantity == 0 {
                let error = LineError::zero_quantity(stock);
                st.reject(line_id, error.clone());
                return Ok(QuantityOutcome::Rejected(error));
            }
            st.next_ticket += 1;
            let ticket = st.next_ticket;
            st.states.set(line_id.clone(), LineState::Pending(ticket));
            (ticket, prior)
        };

        debug!(line_id = %line_id, quantity, ticket, "checking live stock");
        let response = self.authority.update_line_quantity(&self.session, line_id, quantity).await;

        let mut st = self.inner.lock().await;
        if st.states.get(line_id) != &LineState::Pending(ticket) || st.line(line_id).is_err() {
            debug!(line_id = %line_id, ticket, "discarding stale stock response");
            st.events.push(CartEvent::StaleResponseDiscarded { line_id: line_id.clone() });
            return Ok(QuantityOutcome::Stale);
        }

        let check = match response {
            Ok(check) => check,
            Err(e) => {
                warn!(line_id = %line_id, error = %e, "stock check failed");
                st.states.set(line_id.clone(), prior);
                st.notify(Notification::error(format!("Failed to check item availability. Please try again. ({})", e)));
                return Err(CartError::Authority(e.to_string()));
            }
        };

        if check.accepted {
            if let Some(line) = st.cart.as_mut().and_then(|c| c.line_mut(line_id)) { line.quantity = quantity; }
            if quantity > MAX_DROPDOWN_QUANTITY {
                st.custom_quantities.insert(line_id.clone(), quantity.to_string());
            } else {
                st.custom_quantities.remove(line_id);
            }
            st.states.set(line_id.clone(), LineState::Valid);
            st.events.push(CartEvent::QuantityCommitted { line_id: line_id.clone(), quantity });
            st.notify(Notification::success("Quantity Available!"));
            info!(line_id = %line_id, quantity, "quantity committed");
            return Ok(QuantityOutcome::Committed(quantity));
        }

        // The authority's count replaces the client snapshot from here on.
        if let Some(line) = st.cart.as_mut().and_then(|c| c.line_mut(line_id)) { line.item.stock_quantity = check.available_stock; }

        if check.available_stock <= 0 {
            info!(line_id = %line_id, "line went out of stock");
            st.reject(line_id, LineError::out_of_stock());
            st.notify(Notification::error("Item out of stock!"));
            let lines = st.cart.as_ref().map(|c| c.lines.clone()).unwrap_or_default();
            drop(st);
            if let Err(e) = self.save_lines(&lines).await {
                warn!(line_id = %line_id, error = %e, "snapshot after stock conflict not saved");
                self.inner.lock().await.notify(Notification::error("Item out of stock! Your cart may not have been saved."));
            }
            return Ok(QuantityOutcome::OutOfStock);
        }

        let available = display_stock(check.available_stock);
        info!(line_id = %line_id, quantity, available, "requested quantity exceeds live stock");
        st.reject(line_id, LineError::only_available(available));
        Ok(QuantityOutcome::ExceedsStock { available })
    }

    pub async fn stage_removal(&self, line_id: &LineId) -> Result<()> {
        let mut st = self.inner.lock().await;
        st.line(line_id)?;
        st.staged_removal = Some(line_id.clone());
        Ok(())
    }

    pub async fn cancel_removal(&self) { self.inner.lock().await.staged_removal = None; }

    /// Removes the staged line. Any round trip still in flight for it becomes stale.
    pub async fn confirm_removal(&self) -> Result<()> {
        let line_id = self.inner.lock().await.staged_removal.take().ok_or(CartError::NoStagedRemoval)?;
        self.ensure_authenticated().await?;
        let removed = self.authority.remove_line(&self.session, &line_id).await;

        let mut st = self.inner.lock().await;
        match removed {
            Ok(()) => {
                if let Some(cart) = st.cart.as_mut() { cart.remove_line(&line_id); }
                st.states.remove(&line_id);
                st.custom_quantities.remove(&line_id);
                st.events.push(CartEvent::LineRemoved { line_id: line_id.clone() });
                st.notify(Notification::success("Item removed successfully!"));
                info!(line_id = %line_id, "line removed");
                Ok(())
            }
            Err(e) => {
                warn!(line_id = %line_id, error = %e, "line removal failed");
                st.notify(Notification::error("Failed to remove item from cart. Please try again."));
                Err(CartError::Authority(e.to_string()))
            }
        }
    }

    /// Saves the given lines as the cart's last-write-wins snapshot.
    pub async fn persist_snapshot(&self, lines: &[CartLine]) -> Result<()> {
        self.ensure_authenticated().await?;
        self.save_lines(lines).await
    }

    async fn save_lines(&self, lines: &[CartLine]) -> Result<()> {
        match self.authority.save_cart_snapshot(&self.session, lines).await {
            Ok(()) => {
                debug!(lines = lines.len(), "cart snapshot saved");
                self.inner.lock().await.events.push(CartEvent::SnapshotSaved { lines: lines.len() });
                Ok(())
            }
            Err(e) => {
                self.inner.lock().await.events.push(CartEvent::SnapshotFailed { reason: e.to_string() });
                Err(CartError::Persistence(e.to_string()))
            }
        }
    }

    pub async fn is_line_eligible(&self, line_id: &LineId) -> bool {
        let st = self.inner.lock().await;
        st.line(line_id).map(|l| is_line_eligible(l, &st.states)).unwrap_or(false)
    }

    pub async fn snapshot(&self) -> CartSnapshot {
        let st = self.inner.lock().await;
        CartSnapshot { cart: st.cart.clone(), states: st.states.clone() }
    }

    pub async fn view(&self) -> CartView {
        let st = self.inner.lock().await;
        let lines = st.cart.iter().flat_map(|c| c.lines.iter()).map(|line| LineView {
            line: line.clone(),
            display_stock: display_stock(line.item.stock_quantity),
            displayed_quantity: displayed_quantity(line, &st.states),
            options: quantity_options(line.item.stock_quantity).collect(),
            custom_quantity: st.custom_quantities.get(&line.id).cloned(),
            state: st.states.get(&line.id).clone(),
            eligible: is_line_eligible(line, &st.states),
        }).collect();
        CartView {
            lines,
            errors: st.states.error_map(),
            notification: st.notification.clone(),
            load_error: st.load_error.clone(),
            staged_removal: st.staged_removal.clone(),
        }
    }

    pub async fn error_map(&self) -> LineErrorMap { self.inner.lock().await.states.error_map() }
    pub async fn line_state(&self, line_id: &LineId) -> LineState { self.inner.lock().await.states.get(line_id).clone() }
    pub async fn custom_quantity(&self, line_id: &LineId) -> Option<String> { self.inner.lock().await.custom_quantities.get(line_id).cloned() }
    pub async fn notification(&self) -> Option<Notification> { self.inner.lock().await.notification.clone() }
    pub async fn dismiss_notification(&self) { self.inner.lock().await.notification = None; }
    pub async fn take_events(&self) -> Vec<CartEvent> { std::mem::take(&mut self.inner.lock().await.events) }

    /// `None` while another checkout on this reconciler has not finished.
    pub(crate) fn begin_checkout(&self) -> Option<CheckoutGuard<'_>> {
        self.checkout_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CheckoutGuard(&self.checkout_in_flight))
    }

    /// The authority destroys the cart once an order exists; mirror that locally so the lines cannot be resubmitted.
    pub(crate) async fn order_placed(&self) {
        let mut st = self.inner.lock().await;
        if let Some(cart) = st.cart.as_mut() { cart.lines.clear(); }
        st.states.clear();
        st.custom_quantities.clear();
        st.staged_removal = None;
    }

    pub(crate) async fn notify(&self, notification: Notification) { self.inner.lock().await.notify(notification); }
    pub(crate) async fn record(&self, event: CartEvent) { self.inner.lock().await.events.push(event); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use tokio::sync::Notify;
    use crate::domain::aggregates::LineErrorKind;
    use crate::services::memory::InMemoryBackend;
    use crate::services::ports::{AuthorityError, StockCheck};
    use crate::{Item, ItemId};

    fn item(id: &str, price: i64, stock: i64) -> Item {
        Item { id: ItemId::new(id), name: id.to_uppercase(), price: Decimal::new(price, 0), stock_quantity: stock }
    }

    fn session() -> SessionContext { SessionContext::new("tok", "device-1") }

    async fn cart_with(backend: &InMemoryBackend, adds: &[(&str, u32)]) -> (Arc<CartReconciler>, Vec<LineId>) {
        let reconciler = Arc::new(CartReconciler::new(Arc::new(backend.clone()), session()));
        let mut ids = vec![];
        for (item_id, quantity) in adds {
            let cart = backend.add_line(&session(), &ItemId::new(*item_id), *quantity).await.unwrap();
            ids.push(cart.lines.iter().find(|l| l.item.id.as_str() == *item_id).unwrap().id.clone());
        }
        reconciler.fetch_cart().await.unwrap();
        (reconciler, ids)
    }

    fn backend() -> InMemoryBackend {
        InMemoryBackend::builder()
            .item(item("pen", 10, 5))
            .item(item("ink", 5, 20))
            .session("tok", "ada")
            .build()
    }

    #[tokio::test]
    async fn test_unauthenticated_session_never_reaches_authority() {
        let b = backend();
        let r = CartReconciler::new(Arc::new(b.clone()), SessionContext::anonymous("device-9"));
        assert_eq!(r.fetch_cart().await.unwrap_err(), CartError::NotAuthenticated);
        assert!(r.notification().await.unwrap().is_error());
        assert_eq!(b.stock_checks().await, 0);
    }

    #[tokio::test]
    async fn test_fetch_seeds_custom_quantities_above_ten() {
        let b = backend();
        let (r, ids) = cart_with(&b, &[("pen", 2), ("ink", 12)]).await;
        assert_eq!(r.custom_quantity(&ids[0]).await, None);
        assert_eq!(r.custom_quantity(&ids[1]).await.as_deref(), Some("12"));
    }

    #[tokio::test]
    async fn test_load_failure_shows_no_partial_cart() {
        let b = backend();
        let (r, _) = cart_with(&b, &[("pen", 2)]).await;
        b.fail_loads(true).await;
        assert!(matches!(r.fetch_cart().await, Err(CartError::Load(_))));
        let view = r.view().await;
        assert!(view.lines.is_empty());
        assert_eq!(view.load_error.as_deref(), Some(LOAD_FAILED));
        assert!(r.snapshot().await.cart.is_none());
    }

    #[tokio::test]
    async fn test_accepted_quantity_commits_and_is_idempotent() {
        let b = backend();
        let (r, ids) = cart_with(&b, &[("pen", 1)]).await;
        assert_eq!(r.change_quantity(&ids[0], 3).await.unwrap(), QuantityOutcome::Committed(3));
        let first = r.snapshot().await;
        assert_eq!(r.change_quantity(&ids[0], 3).await.unwrap(), QuantityOutcome::Committed(3));
        assert_eq!(r.snapshot().await, first);
        assert!(r.is_line_eligible(&ids[0]).await);
        assert!(r.error_map().await.is_empty());
        assert_eq!(r.notification().await, Some(Notification::success("Quantity Available!")));
    }

    #[tokio::test]
    async fn test_insufficient_stock_reports_authoritative_count() {
        let b = backend();
        let (r, ids) = cart_with(&b, &[("pen", 1)]).await;
        let outcome = r.change_quantity(&ids[0], 7).await.unwrap();
        assert_eq!(outcome, QuantityOutcome::ExceedsStock { available: 5 });

        let view = r.view().await;
        assert_eq!(view.lines[0].displayed_quantity, 5);
        assert_eq!(view.lines[0].line.quantity, 1);
        assert!(!view.lines[0].eligible);
        assert_eq!(view.errors.get(&ids[0]).unwrap().kind, LineErrorKind::ExceedsStock { available: 5 });
        assert!(b.snapshots().await.is_empty());
    }

    #[tokio::test]
    async fn test_shrunk_stock_count_replaces_stale_snapshot() {
        let b = backend();
        let (r, ids) = cart_with(&b, &[("ink", 2)]).await;
        b.set_stock(&ItemId::new("ink"), 3).await;
        assert_eq!(r.change_quantity(&ids[0], 15).await.unwrap(), QuantityOutcome::ExceedsStock { available: 3 });
        let view = r.view().await;
        assert_eq!(view.lines[0].display_stock, 3);
        assert_eq!(view.lines[0].options.len(), 3);
    }

    #[tokio::test]
    async fn test_out_of_stock_persists_snapshot() {
        let b = backend();
        let (r, ids) = cart_with(&b, &[("pen", 2)]).await;
        b.set_stock(&ItemId::new("pen"), 0).await;
        assert_eq!(r.change_quantity(&ids[0], 2).await.unwrap(), QuantityOutcome::OutOfStock);

        assert_eq!(r.line_state(&ids[0]).await, LineState::Invalid(LineError::out_of_stock()));
        assert_eq!(r.notification().await, Some(Notification::error("Item out of stock!")));
        let saved = b.snapshots().await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0][0].id, ids[0]);
        assert!(!r.is_line_eligible(&ids[0]).await);
    }

    #[tokio::test]
    async fn test_out_of_stock_save_failure_is_not_fatal() {
        let b = backend();
        let (r, ids) = cart_with(&b, &[("pen", 2)]).await;
        b.set_stock(&ItemId::new("pen"), -3).await;
        b.fail_saves(true).await;
        assert_eq!(r.change_quantity(&ids[0], 2).await.unwrap(), QuantityOutcome::OutOfStock);
        assert!(r.notification().await.unwrap().message.contains("may not have been saved"));
        assert!(r.take_events().await.iter().any(|e| matches!(e, CartEvent::SnapshotFailed { .. })));
    }

    #[tokio::test]
    async fn test_custom_entry_below_threshold_skips_round_trip() {
        let b = backend();
        let (r, ids) = cart_with(&b, &[("ink", 12)]).await;
        let outcome = r.change_custom_quantity(&ids[0], "8").await.unwrap();
        assert_eq!(outcome, QuantityOutcome::Rejected(LineError::below_custom_threshold()));
        assert_eq!(b.stock_checks().await, 0);
        assert!(!r.is_line_eligible(&ids[0]).await);
        assert_eq!(r.custom_quantity(&ids[0]).await.as_deref(), Some("8"));
    }

    #[tokio::test]
    async fn test_custom_entry_valid_goes_live() {
        let b = backend();
        let (r, ids) = cart_with(&b, &[("ink", 12)]).await;
        assert_eq!(r.change_custom_quantity(&ids[0], "abc").await.unwrap(), QuantityOutcome::Rejected(LineError::invalid_input()));
        assert_eq!(r.change_custom_quantity(&ids[0], "18").await.unwrap(), QuantityOutcome::Committed(18));
        assert_eq!(b.stock_checks().await, 1);
        assert!(r.error_map().await.is_empty());
    }

    #[tokio::test]
    async fn test_custom_option_round_trips_eleven() {
        let b = backend();
        let (r, ids) = cart_with(&b, &[("ink", 2)]).await;
        assert_eq!(r.select_quantity(&ids[0], QuantityOption::Custom).await.unwrap(), QuantityOutcome::Committed(11));
        assert_eq!(r.custom_quantity(&ids[0]).await.as_deref(), Some("11"));
        assert_eq!(r.select_quantity(&ids[0], QuantityOption::Exact(4)).await.unwrap(), QuantityOutcome::Committed(4));
        assert_eq!(r.custom_quantity(&ids[0]).await, None);
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected_locally() {
        let b = backend();
        let (r, ids) = cart_with(&b, &[("pen", 2)]).await;
        assert!(matches!(r.change_quantity(&ids[0], 0).await.unwrap(), QuantityOutcome::Rejected(_)));
        assert_eq!(b.stock_checks().await, 0);
    }

    #[tokio::test]
    async fn test_removal_is_staged_until_confirmed() {
        let b = backend();
        let (r, ids) = cart_with(&b, &[("pen", 2), ("ink", 1)]).await;
        r.stage_removal(&ids[0]).await.unwrap();
        r.cancel_removal().await;
        assert_eq!(r.confirm_removal().await.unwrap_err(), CartError::NoStagedRemoval);
        assert_eq!(r.view().await.lines.len(), 2);

        r.stage_removal(&ids[0]).await.unwrap();
        r.confirm_removal().await.unwrap();
        let view = r.view().await;
        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.notification, Some(Notification::success("Item removed successfully!")));
    }

    #[tokio::test]
    async fn test_failed_removal_keeps_line() {
        let b = backend();
        let (r, ids) = cart_with(&b, &[("pen", 2)]).await;
        b.fail_removes(true).await;
        r.stage_removal(&ids[0]).await.unwrap();
        assert!(matches!(r.confirm_removal().await, Err(CartError::Authority(_))));
        let view = r.view().await;
        assert_eq!(view.lines.len(), 1);
        assert!(view.notification.unwrap().is_error());
        assert_eq!(view.staged_removal, None);
    }

    #[tokio::test]
    async fn test_add_selection_requires_valid_quantity() {
        let b = backend();
        let (r, _) = cart_with(&b, &[]).await;
        let mut sel = ItemSelection::new(item("ink", 5, 20));
        sel.select(QuantityOption::Custom);
        sel.enter_custom("9");
        assert!(matches!(r.add_selection(&sel).await, Err(CartError::InvalidSelection(_))));

        sel.enter_custom("14");
        let cart = r.add_selection(&sel).await.unwrap();
        assert_eq!(cart.lines[0].quantity, 14);
        assert_eq!(r.notification().await, Some(Notification::success("14 INK(s) added to cart!")));
        assert_eq!(r.custom_quantity(&cart.lines[0].id).await.as_deref(), Some("14"));
    }

    #[tokio::test]
    async fn test_oversized_custom_entry_clamps_to_stock() {
        let b = backend();
        let (r, ids) = cart_with(&b, &[("ink", 12)]).await;
        let outcome = r.change_custom_quantity(&ids[0], "99999999999").await.unwrap();
        let QuantityOutcome::Rejected(error) = outcome else { panic!("expected local rejection, got {outcome:?}") };
        assert_eq!(error.kind, LineErrorKind::ExceedsStock { available: 20 });
        assert_eq!(r.view().await.lines[0].displayed_quantity, 20);
        assert_eq!(b.stock_checks().await, 0);
    }

    /// Holds every stock check until released.
    struct GatedAuthority {
        inner: InMemoryBackend,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl InventoryAuthority for GatedAuthority {
        async fn is_authenticated(&self, s: &SessionContext) -> bool { self.inner.is_authenticated(s).await }
        async fn get_cart(&self, s: &SessionContext) -> std::result::Result<Cart, AuthorityError> { self.inner.get_cart(s).await }
        async fn add_line(&self, s: &SessionContext, i: &ItemId, q: u32) -> std::result::Result<Cart, AuthorityError> { self.inner.add_line(s, i, q).await }
        async fn update_line_quantity(&self, s: &SessionContext, l: &LineId, q: u32) -> std::result::Result<StockCheck, AuthorityError> {
            self.gate.notified().await;
            self.inner.update_line_quantity(s, l, q).await
        }
        async fn remove_line(&self, s: &SessionContext, l: &LineId) -> std::result::Result<(), AuthorityError> { self.inner.remove_line(s, l).await }
        async fn save_cart_snapshot(&self, s: &SessionContext, lines: &[CartLine]) -> std::result::Result<(), AuthorityError> { self.inner.save_cart_snapshot(s, lines).await }
    }

    async fn gated(adds: &[(&str, u32)]) -> (Arc<CartReconciler>, Vec<LineId>, Arc<Notify>) {
        let b = backend();
        let mut ids = vec![];
        for (item_id, quantity) in adds {
            let cart = b.add_line(&session(), &ItemId::new(*item_id), *quantity).await.unwrap();
            ids.push(cart.lines.iter().find(|l| l.item.id.as_str() == *item_id).unwrap().id.clone());
        }
        let gate = Arc::new(Notify::new());
        let r = Arc::new(CartReconciler::new(Arc::new(GatedAuthority { inner: b, gate: gate.clone() }), session()));
        r.fetch_cart().await.unwrap();
        (r, ids, gate)
    }

    async fn wait_until_pending(r: &CartReconciler, id: &LineId) {
        while !r.line_state(id).await.is_pending() { tokio::task::yield_now().await; }
    }

    #[tokio::test]
    async fn test_second_change_refused_while_pending() {
        let (r, ids, gate) = gated(&[("pen", 1)]).await;
        let task = tokio::spawn({
            let r = r.clone();
            let id = ids[0].clone();
            async move { r.change_quantity(&id, 2).await }
        });
        wait_until_pending(&r, &ids[0]).await;
        assert_eq!(r.change_quantity(&ids[0], 3).await.unwrap_err(), CartError::LineBusy(ids[0].clone()));
        assert!(!r.is_line_eligible(&ids[0]).await);
        gate.notify_one();
        assert_eq!(task.await.unwrap().unwrap(), QuantityOutcome::Committed(2));
    }

    #[tokio::test]
    async fn test_dropdown_change_while_pending_keeps_custom_text() {
        let (r, ids, gate) = gated(&[("ink", 12)]).await;
        let task = tokio::spawn({
            let r = r.clone();
            let id = ids[0].clone();
            async move { r.change_quantity(&id, 13).await }
        });
        wait_until_pending(&r, &ids[0]).await;
        assert_eq!(r.select_quantity(&ids[0], QuantityOption::Exact(3)).await.unwrap_err(), CartError::LineBusy(ids[0].clone()));
        assert_eq!(r.select_quantity(&ids[0], QuantityOption::Custom).await.unwrap_err(), CartError::LineBusy(ids[0].clone()));
        assert_eq!(r.custom_quantity(&ids[0]).await.as_deref(), Some("12"));
        gate.notify_one();
        assert_eq!(task.await.unwrap().unwrap(), QuantityOutcome::Committed(13));
        assert_eq!(r.custom_quantity(&ids[0]).await.as_deref(), Some("13"));
    }

    #[tokio::test]
    async fn test_response_for_removed_line_is_discarded() {
        let (r, ids, gate) = gated(&[("pen", 1), ("ink", 1)]).await;
        let task = tokio::spawn({
            let r = r.clone();
            let id = ids[0].clone();
            async move { r.change_quantity(&id, 2).await }
        });
        wait_until_pending(&r, &ids[0]).await;
        r.stage_removal(&ids[0]).await.unwrap();
        r.confirm_removal().await.unwrap();
        gate.notify_one();
        assert_eq!(task.await.unwrap().unwrap(), QuantityOutcome::Stale);
        let view = r.view().await;
        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.lines[0].line.id, ids[1]);
    }
}
