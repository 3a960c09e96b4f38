use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vevurn_core::{DomainError, Money, ProductId};

/// Stock-bearing view of a catalog product.
///
/// This is the row the checkout transaction locks: price, on-hand quantity and
/// the reorder threshold all come from here, never from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStock {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    /// Price in smallest currency unit.
    pub unit_price: Money,
    pub stock_quantity: i64,
    pub min_stock_level: i64,
    pub active: bool,
    /// Bumped on every stock change.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Result of a single stock mutation, used to write the movement record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub product_id: ProductId,
    pub quantity_change: i64,
    pub stock_before: i64,
    pub stock_after: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error("insufficient stock for {sku}: requested {requested}, available {available}")]
    Insufficient {
        product_id: ProductId,
        sku: String,
        requested: i64,
        available: i64,
    },

    #[error("product {sku} is inactive")]
    Inactive { product_id: ProductId, sku: String },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ProductStock {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.unit_price.is_negative() {
            return Err(DomainError::validation("unit_price cannot be negative"));
        }
        if self.stock_quantity < 0 {
            return Err(DomainError::validation("stock_quantity cannot be negative"));
        }
        if self.min_stock_level < 0 {
            return Err(DomainError::validation("min_stock_level cannot be negative"));
        }
        Ok(())
    }

    /// Remove `quantity` units for a sale.
    pub fn deduct(&mut self, quantity: i64, now: DateTime<Utc>) -> Result<StockChange, StockError> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive").into());
        }
        if !self.active {
            return Err(StockError::Inactive {
                product_id: self.id,
                sku: self.sku.clone(),
            });
        }
        if quantity > self.stock_quantity {
            return Err(StockError::Insufficient {
                product_id: self.id,
                sku: self.sku.clone(),
                requested: quantity,
                available: self.stock_quantity,
            });
        }
        Ok(self.apply_delta(-quantity, now))
    }

    /// Put `quantity` units back (sale reversal, restock).
    pub fn restore(&mut self, quantity: i64, now: DateTime<Utc>) -> Result<StockChange, DomainError> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        self.stock_quantity
            .checked_add(quantity)
            .ok_or_else(|| DomainError::overflow("stock"))?;
        Ok(self.apply_delta(quantity, now))
    }

    /// Manual correction in either direction; stock never goes below zero.
    pub fn adjust(&mut self, delta: i64, now: DateTime<Utc>) -> Result<StockChange, DomainError> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        let new_stock = self
            .stock_quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::overflow("stock"))?;
        if new_stock < 0 {
            return Err(DomainError::invariant("stock cannot go negative"));
        }
        Ok(self.apply_delta(delta, now))
    }

    fn apply_delta(&mut self, delta: i64, now: DateTime<Utc>) -> StockChange {
        let before = self.stock_quantity;
        self.stock_quantity += delta;
        self.version += 1;
        self.updated_at = now;
        StockChange {
            product_id: self.id,
            quantity_change: delta,
            stock_before: before,
            stock_after: self.stock_quantity,
        }
    }
}
