//! Stock clamping and quantity option enumeration.

use std::ops::RangeInclusive;
use crate::domain::value_objects::QuantityOption;

/// Largest quantity offered directly by the dropdown.
pub const MAX_DROPDOWN_QUANTITY: u32 = 10;
/// Smallest quantity accepted on the custom entry path.
pub const CUSTOM_QUANTITY_FLOOR: u32 = MAX_DROPDOWN_QUANTITY + 1;

/// Stock as shown to the user and used in every computation. Negative upstream stock reads as zero.
pub fn display_stock(raw: i64) -> u32 {
    raw.clamp(0, u32::MAX as i64) as u32
}

/// Quantities a line may legally hold. Empty when the item is unavailable.
pub fn legal_quantity_range(raw: i64) -> RangeInclusive<u32> {
    // 1..=0 is the canonical empty inclusive range
    1..=display_stock(raw)
}

pub fn quantity_options(raw: i64) -> QuantityOptions {
    let stock = display_stock(raw);
    QuantityOptions { next: 1, last_exact: stock.min(MAX_DROPDOWN_QUANTITY), custom_pending: stock > MAX_DROPDOWN_QUANTITY }
}

/// Lazy dropdown entries: `Exact(1..=min(10, stock))`, then `Custom` when stock exceeds 10.
/// Clone it to restart.
#[derive(Clone, Debug)]
pub struct QuantityOptions {
    next: u32,
    last_exact: u32,
    custom_pending: bool,
}

impl Iterator for QuantityOptions {
    type Item = QuantityOption;

    fn next(&mut self) -> Option<QuantityOption> {
        if self.next <= self.last_exact {
            let n = self.next;
            self.next += 1;
            return Some(QuantityOption::Exact(n));
        }
        if self.custom_pending {
            self.custom_pending = false;
            return Some(QuantityOption::Custom);
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.last_exact + 1).saturating_sub(self.next) as usize + usize::from(self.custom_pending);
        (left, Some(left))
    }
}

impl ExactSizeIterator for QuantityOptions {}
