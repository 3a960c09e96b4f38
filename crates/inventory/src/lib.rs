//! Inventory domain module.
//!
//! Stock levels, the movement audit trail, and low-stock alerting, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage). The
//! transaction engine decides *when* these run; this crate decides *what*
//! a stock change means.

pub mod alert;
pub mod movement;
pub mod stock;

pub use alert::{AlertDecision, AlertSeverity, AlertStatus, StockAlert, evaluate_alert};
pub use movement::{InventoryMovement, MovementType};
pub use stock::{ProductStock, StockChange, StockError};
