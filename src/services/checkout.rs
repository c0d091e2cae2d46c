//! Checkout gating: eligibility, final snapshot, order hand-off.

use std::sync::Arc;
use serde::Serialize;
use tracing::{info, warn};
use crate::domain::aggregates::{ineligible_lines, is_line_eligible, LineStates};
use crate::domain::events::{CartEvent, Notification};
use crate::domain::pricing::{PricingBreakdown, PricingEngine};
use super::ports::{OrderOutcome, OrderService};
use super::reconciler::CartReconciler;
use crate::{Cart, CartError, OrderRef, Result};

const EMPTY_CART: &str = "Your cart is empty. Cannot proceed to checkout.";
const CHECKOUT_IN_PROGRESS: &str = "Checkout is already in progress.";

#[derive(Clone, Debug, Serialize)]
pub struct PlacedOrder {
    pub order: OrderRef,
    /// Totals of the snapshot the order was created from.
    pub pricing: PricingBreakdown,
}

pub struct CheckoutGate {
    orders: Arc<dyn OrderService>,
    pricing: PricingEngine,
}

impl CheckoutGate {
    pub fn new(orders: Arc<dyn OrderService>, pricing: PricingEngine) -> Self { Self { orders, pricing } }

    pub fn is_eligible(cart: &Cart, states: &LineStates) -> bool {
        !cart.is_empty() && cart.lines.iter().all(|l| is_line_eligible(l, states))
    }

    /// One aggregated message naming every ineligible line, or `None` when checkout may proceed.
    pub fn blocking_message(cart: &Cart, states: &LineStates) -> Option<String> {
        if cart.is_empty() { return Some(EMPTY_CART.to_string()); }
        let names: Vec<&str> = ineligible_lines(cart, states).map(|l| l.item.name.as_str()).collect();
        if names.is_empty() { return None; }
        Some(format!("Cannot proceed to checkout. Please update quantities for: {}", names.join(", ")))
    }

    /// Re-confirms the cart with a final snapshot, then creates the order.
    /// A stock conflict at submission is surfaced as-is and never retried.
    pub async fn proceed(&self, reconciler: &CartReconciler) -> Result<PlacedOrder> {
        let Some(_running) = reconciler.begin_checkout() else {
            info!("checkout refused while another is in flight");
            return Err(CartError::CheckoutBlocked(CHECKOUT_IN_PROGRESS.to_string()));
        };
        let snapshot = reconciler.snapshot().await;
        let cart = snapshot.cart.unwrap_or_else(|| Cart::new(""));
        if let Some(message) = Self::blocking_message(&cart, &snapshot.states) {
            info!(cart_id = %cart.id, "checkout blocked");
            reconciler.notify(Notification::error(message.clone())).await;
            return Err(CartError::CheckoutBlocked(message));
        }

        if let Err(e) = reconciler.persist_snapshot(&cart.lines).await {
            warn!(cart_id = %cart.id, error = %e, "final snapshot failed");
            reconciler.notify(Notification::error("Failed to proceed to checkout. Please try again.")).await;
            return Err(e);
        }

        let pricing = self.pricing.breakdown(&cart, &snapshot.states);
        match self.orders.create_order(reconciler.session(), &cart.id).await {
            Ok(OrderOutcome::Placed(order)) => {
                info!(order_id = %order.id, total = %pricing.total.amount(), "order placed");
                reconciler.order_placed().await;
                reconciler.record(CartEvent::OrderPlaced { order_id: order.id.clone(), total: pricing.total.amount() }).await;
                reconciler.notify(Notification::success("Order placed successfully!")).await;
                Ok(PlacedOrder { order, pricing })
            }
            Ok(OrderOutcome::StockConflict(message)) => {
                warn!(cart_id = %cart.id, %message, "stock conflict at submission");
                reconciler.notify(Notification::error(message.clone())).await;
                Err(CartError::SubmissionConflict(message))
            }
            Err(e) => {
                warn!(cart_id = %cart.id, error = %e, "order creation failed");
                reconciler.notify(Notification::error("Failed to place order. Please try again.")).await;
                Err(CartError::Authority(e.to_string()))
            }
        }
    }
}
