//! `vevurn-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, money, and the domain error model shared by the POS crates.

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::{AlertId, CustomerId, MovementId, PaymentId, ProductId, SaleId, SaleItemId, UserId};
pub use money::Money;
