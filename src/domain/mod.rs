//! Domain layer: value objects, stock policy, line state and pricing.

pub mod aggregates;
pub mod events;
pub mod policy;
pub mod pricing;
pub mod value_objects;
