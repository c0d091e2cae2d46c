//! Quantity selection for a single item before it is added to the cart

use crate::domain::policy::{display_stock, quantity_options, validate, EntryPath, QuantityInput, QuantityOptions, Verdict, CUSTOM_QUANTITY_FLOOR, MAX_DROPDOWN_QUANTITY};
use crate::domain::value_objects::QuantityOption;
use crate::Item;
use super::LineError;

#[derive(Clone, Debug)]
pub struct ItemSelection {
    item: Item,
    quantity: u32,
    custom_text: String,
    error: Option<LineError>,
}

impl ItemSelection {
    pub fn new(item: Item) -> Self {
        let quantity = if display_stock(item.stock_quantity) > 0 { 1 } else { 0 };
        Self { item, quantity, custom_text: String::new(), error: None }
    }

    /// Replays a requested quantity through the same path a user would take: dropdown up to 10, custom above.
    pub fn with_quantity(item: Item, quantity: u32) -> Self {
        let mut selection = Self::new(item);
        if quantity > MAX_DROPDOWN_QUANTITY {
            selection.select(QuantityOption::Custom);
            selection.enter_custom(&quantity.to_string());
        } else {
            selection.select(QuantityOption::Exact(quantity));
        }
        selection
    }

    pub fn item(&self) -> &Item { &self.item }
    pub fn quantity(&self) -> u32 { self.quantity }
    pub fn custom_text(&self) -> &str { &self.custom_text }
    pub fn error(&self) -> Option<&LineError> { self.error.as_ref() }
    pub fn is_available(&self) -> bool { display_stock(self.item.stock_quantity) > 0 }
    pub fn options(&self) -> QuantityOptions { quantity_options(self.item.stock_quantity) }
    /// The free-form field is shown once the quantity leaves the dropdown range.
    pub fn shows_custom_field(&self) -> bool { self.quantity > MAX_DROPDOWN_QUANTITY }

    pub fn select(&mut self, option: QuantityOption) {
        match option {
            QuantityOption::Exact(n) => {
                self.quantity = n;
                self.custom_text.clear();
            }
            QuantityOption::Custom => {
                self.quantity = CUSTOM_QUANTITY_FLOOR;
                self.custom_text = CUSTOM_QUANTITY_FLOOR.to_string();
            }
        }
        self.error = None;
    }

    pub fn enter_custom(&mut self, text: &str) {
        self.custom_text = text.to_string();
        let stock = display_stock(self.item.stock_quantity);
        match validate(QuantityInput::Text(text), stock, EntryPath::Custom) {
            Verdict::Valid(n) => {
                self.quantity = n;
                self.error = None;
            }
            Verdict::Invalid(error) => {
                self.quantity = error.proposed.unwrap_or(CUSTOM_QUANTITY_FLOOR);
                self.error = Some(error);
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.quantity > 0 && self.quantity <= display_stock(self.item.stock_quantity) && self.error.is_none()
    }
}
