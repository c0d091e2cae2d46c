//! Per-line reconciliation state

use std::collections::{BTreeMap, HashMap};
use serde::{Deserialize, Serialize};
use crate::domain::policy::display_stock;
use crate::{Cart, CartLine, LineId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineErrorKind {
    InvalidInput,
    BelowCustomThreshold,
    /// `available` is the authoritative count at the time of the check.
    ExceedsStock { available: u32 },
    OutOfStock,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineError {
    #[serde(flatten)]
    pub kind: LineErrorKind,
    pub message: String,
    /// Quantity to pre-fill for re-entry. A proposal only, never committed on its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed: Option<u32>,
}

impl LineError {
    pub fn invalid_input() -> Self {
        Self { kind: LineErrorKind::InvalidInput, message: "Please enter a valid number".into(), proposed: None }
    }
    pub fn below_custom_threshold() -> Self {
        Self { kind: LineErrorKind::BelowCustomThreshold, message: "Please select 11 or more for custom quantity".into(), proposed: None }
    }
    pub fn exceeds_stock(available: u32) -> Self {
        Self { kind: LineErrorKind::ExceedsStock { available }, message: format!("Quantity exceeds available stock ({})", available), proposed: Some(available) }
    }
    /// Authority-reported shortfall; `available` may differ from the client snapshot.
    pub fn only_available(available: u32) -> Self {
        Self { kind: LineErrorKind::ExceedsStock { available }, message: format!("Only {} items are available in stock.", available), proposed: Some(available) }
    }
    pub fn zero_quantity(available: u32) -> Self {
        Self { kind: LineErrorKind::ExceedsStock { available }, message: "Quantity must be at least 1".into(), proposed: None }
    }
    pub fn out_of_stock() -> Self {
        Self { kind: LineErrorKind::OutOfStock, message: "This item is no longer available in stock.".into(), proposed: None }
    }
}

impl std::fmt::Display for LineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.message) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum LineState {
    #[default]
    Idle,
    /// A live stock round trip is in flight. The ticket identifies it.
    Pending(u64),
    Valid,
    Invalid(LineError),
}

impl LineState {
    /// No error and nothing in flight.
    pub fn is_clear(&self) -> bool { matches!(self, Self::Idle | Self::Valid) }
    pub fn is_pending(&self) -> bool { matches!(self, Self::Pending(_)) }
    pub fn error(&self) -> Option<&LineError> {
        match self { Self::Invalid(e) => Some(e), _ => None }
    }
}

/// Tagged state for every line of one cart. Lines without an entry are `Idle`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LineStates(HashMap<LineId, LineState>);

static IDLE: LineState = LineState::Idle;

impl LineStates {
    pub fn new() -> Self { Self::default() }
    pub fn get(&self, id: &LineId) -> &LineState { self.0.get(id).unwrap_or(&IDLE) }
    pub fn set(&mut self, id: LineId, state: LineState) { self.0.insert(id, state); }
    pub fn remove(&mut self, id: &LineId) -> Option<LineState> { self.0.remove(id) }
    pub fn clear(&mut self) { self.0.clear(); }

    /// Inline errors, derived from `Invalid` states.
    pub fn error_map(&self) -> LineErrorMap {
        LineErrorMap(self.0.iter().filter_map(|(id, s)| s.error().map(|e| (id.clone(), e.clone()))).collect())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineErrorMap(BTreeMap<LineId, LineError>);

impl LineErrorMap {
    pub fn get(&self, id: &LineId) -> Option<&LineError> { self.0.get(id) }
    pub fn contains(&self, id: &LineId) -> bool { self.0.contains_key(id) }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = (&LineId, &LineError)> { self.0.iter() }
}

/// Positive quantity, within displayed stock, no active error and no round trip in flight.
pub fn is_line_eligible(line: &CartLine, states: &LineStates) -> bool {
    line.quantity > 0 && line.quantity <= display_stock(line.item.stock_quantity) && states.get(&line.id).is_clear()
}

pub fn ineligible_lines<'a>(cart: &'a Cart, states: &'a LineStates) -> impl Iterator<Item = &'a CartLine> + 'a {
    cart.lines.iter().filter(move |l| !is_line_eligible(l, states))
}

/// Quantity to show for a line: the clamped proposal while a stock error is active, else the committed quantity.
pub fn displayed_quantity(line: &CartLine, states: &LineStates) -> u32 {
    states.get(&line.id).error().and_then(|e| e.proposed).unwrap_or(line.quantity)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use crate::{Item, ItemId};

    pub(crate) fn line(id: &str, price: i64, stock: i64, quantity: u32) -> CartLine {
        CartLine {
            id: LineId::new(id),
            item: Item { id: ItemId::new(format!("item-{id}")), name: format!("Item {id}"), price: Decimal::new(price, 0), stock_quantity: stock },
            quantity,
        }
    }

    #[test]
    fn test_missing_entry_is_idle_and_clear() {
        let states = LineStates::new();
        assert_eq!(states.get(&LineId::new("x")), &LineState::Idle);
        assert!(states.error_map().is_empty());
    }

    #[test]
    fn test_eligibility_rules() {
        let mut states = LineStates::new();
        assert!(is_line_eligible(&line("a", 10, 5, 3), &states));
        assert!(!is_line_eligible(&line("a", 10, 5, 0), &states));
        assert!(!is_line_eligible(&line("a", 10, 5, 6), &states));
        assert!(!is_line_eligible(&line("a", 10, -2, 1), &states));

        states.set(LineId::new("a"), LineState::Invalid(LineError::out_of_stock()));
        assert!(!is_line_eligible(&line("a", 10, 5, 3), &states));
        states.set(LineId::new("a"), LineState::Pending(1));
        assert!(!is_line_eligible(&line("a", 10, 5, 3), &states));
        states.set(LineId::new("a"), LineState::Valid);
        assert!(is_line_eligible(&line("a", 10, 5, 3), &states));
    }

    #[test]
    fn test_error_map_only_holds_invalid_lines() {
        let mut states = LineStates::new();
        states.set(LineId::new("a"), LineState::Valid);
        states.set(LineId::new("b"), LineState::Invalid(LineError::below_custom_threshold()));
        states.set(LineId::new("c"), LineState::Pending(3));
        let map = states.error_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&LineId::new("b")).unwrap().kind, LineErrorKind::BelowCustomThreshold);
    }

    #[test]
    fn test_displayed_quantity_clamps_while_error_active() {
        let l = line("a", 10, 5, 3);
        let mut states = LineStates::new();
        assert_eq!(displayed_quantity(&l, &states), 3);
        states.set(l.id.clone(), LineState::Invalid(LineError::only_available(5)));
        assert_eq!(displayed_quantity(&l, &states), 5);
        assert_eq!(l.quantity, 3);
        assert!(!is_line_eligible(&l, &states));
    }
}
