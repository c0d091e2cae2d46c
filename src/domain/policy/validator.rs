//! Single-line quantity validation.

use crate::domain::aggregates::LineError;
use super::stock::MAX_DROPDOWN_QUANTITY;

/// How the quantity reached us. The custom path is reserved for values above the dropdown range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryPath { Dropdown, Custom }

#[derive(Clone, Copy, Debug)]
pub enum QuantityInput<'a> {
    Text(&'a str),
    Number(u32),
}

impl QuantityInput<'_> {
    /// Digit strings too long for `u64` still read as a (huge) number, never as garbage.
    fn parse(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(u64::from(*n)),
            Self::Text(raw) => {
                let trimmed = raw.trim();
                let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) { return None; }
                Some(digits.parse::<u64>().unwrap_or(u64::MAX))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Valid(u32),
    Invalid(LineError),
}

impl Verdict {
    pub fn is_valid(&self) -> bool { matches!(self, Self::Valid(_)) }
    pub fn error(&self) -> Option<&LineError> {
        match self { Self::Invalid(error) => Some(error), Self::Valid(_) => None }
    }
}

/// Rules apply in priority order: parse, stock ceiling, custom floor, zero.
pub fn validate(input: QuantityInput<'_>, display_stock: u32, path: EntryPath) -> Verdict {
    let Some(requested) = input.parse() else {
        return Verdict::Invalid(LineError::invalid_input());
    };
    let Ok(requested) = u32::try_from(requested) else {
        return Verdict::Invalid(LineError::exceeds_stock(display_stock));
    };
    if requested > display_stock {
        return Verdict::Invalid(LineError::exceeds_stock(display_stock));
    }
    if path == EntryPath::Custom && requested <= MAX_DROPDOWN_QUANTITY {
        return Verdict::Invalid(LineError::below_custom_threshold());
    }
    if requested == 0 {
        return Verdict::Invalid(LineError::zero_quantity(display_stock));
    }
    Verdict::Valid(requested)
}
