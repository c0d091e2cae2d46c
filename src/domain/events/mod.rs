//! Domain events and user-facing notifications
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::LineErrorKind;
use crate::{CartId, LineId};

#[derive(Clone, Debug, PartialEq)]
pub enum CartEvent {
    Loaded { cart_id: CartId, lines: usize },
    ItemAdded { line_id: LineId, quantity: u32 },
    QuantityCommitted { line_id: LineId, quantity: u32 },
    LineRejected { line_id: LineId, kind: LineErrorKind },
    StaleResponseDiscarded { line_id: LineId },
    LineRemoved { line_id: LineId },
    SnapshotSaved { lines: usize },
    SnapshotFailed { reason: String },
    OrderPlaced { order_id: String, total: Decimal },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind { Success, Error }

/// The single active banner. A newer notification replaces the older one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self { Self { kind: NotificationKind::Success, message: message.into() } }
    pub fn error(message: impl Into<String>) -> Self { Self { kind: NotificationKind::Error, message: message.into() } }
    pub fn is_error(&self) -> bool { self.kind == NotificationKind::Error }
}
