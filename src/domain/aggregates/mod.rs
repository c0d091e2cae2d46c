//! Aggregates module
pub mod cart;
pub mod selection;

pub use cart::{displayed_quantity, ineligible_lines, is_line_eligible, LineError, LineErrorKind, LineErrorMap, LineState, LineStates};
pub use selection::ItemSelection;
