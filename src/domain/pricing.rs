//! Order totals over eligible cart lines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::{is_line_eligible, LineStates};
use crate::domain::value_objects::Money;
use crate::Cart;

/// Tax rate and fixed surcharge applied at checkout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub tax_rate: Decimal,
    pub fixed_surcharge: Decimal,
    pub currency: String,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self { tax_rate: Decimal::new(18, 2), fixed_surcharge: Decimal::new(2, 0), currency: "USD".to_string() }
    }
}

/// Derived from a cart on every read; never stored alongside it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub subtotal: Money,
    pub tax: Money,
    pub surcharge: Money,
    pub total: Money,
}

impl PricingBreakdown {
    pub fn rounded(&self) -> Self {
        Self { subtotal: self.subtotal.rounded(), tax: self.tax.rounded(), surcharge: self.surcharge.rounded(), total: self.total.rounded() }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PricingEngine {
    policy: PricingPolicy,
}

impl PricingEngine {
    pub fn new(policy: PricingPolicy) -> Self { Self { policy } }
    pub fn policy(&self) -> &PricingPolicy { &self.policy }

    /// Ineligible lines contribute nothing.
    pub fn subtotal(&self, cart: &Cart, states: &LineStates) -> Decimal {
        cart.lines.iter()
            .filter(|l| is_line_eligible(l, states))
            .map(|l| l.item.price * Decimal::from(l.quantity))
            .sum()
    }

    pub fn breakdown(&self, cart: &Cart, states: &LineStates) -> PricingBreakdown {
        self.breakdown_for_subtotal(self.subtotal(cart, states))
    }

    pub fn breakdown_for_subtotal(&self, subtotal: Decimal) -> PricingBreakdown {
        let tax = subtotal * self.policy.tax_rate;
        let surcharge = self.policy.fixed_surcharge;
        let currency = &self.policy.currency;
        PricingBreakdown {
            subtotal: Money::new(subtotal, currency),
            tax: Money::new(tax, currency),
            surcharge: Money::new(surcharge, currency),
            total: Money::new(subtotal + tax + surcharge, currency),
        }
    }
}
