use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vevurn_core::{DomainError, MovementId, ProductId, UserId};

use crate::stock::StockChange;

/// Why a stock quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Sale,
    /// Stock returned because a sale was voided or its payment failed.
    SaleReversal,
    Restock,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Sale => "sale",
            MovementType::SaleReversal => "sale_reversal",
            MovementType::Restock => "restock",
            MovementType::Adjustment => "adjustment",
        }
    }

    /// Whether a quantity change of this sign is allowed for the movement type.
    pub fn accepts(&self, quantity_change: i64) -> bool {
        match self {
            MovementType::Sale => quantity_change < 0,
            MovementType::SaleReversal | MovementType::Restock => quantity_change > 0,
            MovementType::Adjustment => quantity_change != 0,
        }
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sale" => Ok(MovementType::Sale),
            "sale_reversal" => Ok(MovementType::SaleReversal),
            "restock" => Ok(MovementType::Restock),
            "adjustment" => Ok(MovementType::Adjustment),
            other => Err(DomainError::validation(format!("unknown movement type '{other}'"))),
        }
    }
}

/// Append-only audit record of a stock quantity change and its cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity_change: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    /// Sale id or receipt number for sale-driven movements.
    pub reference: Option<String>,
    pub reason: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl InventoryMovement {
    pub fn record(
        change: &StockChange,
        movement_type: MovementType,
        reference: Option<String>,
        reason: Option<String>,
        created_by: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let movement = Self {
            id: MovementId::new(),
            product_id: change.product_id,
            movement_type,
            quantity_change: change.quantity_change,
            stock_before: change.stock_before,
            stock_after: change.stock_after,
            reference,
            reason,
            created_by,
            created_at,
        };
        movement.check()?;
        Ok(movement)
    }

    pub fn check(&self) -> Result<(), DomainError> {
        if self.stock_after != self.stock_before + self.quantity_change {
            return Err(DomainError::invariant("movement does not balance"));
        }
        if self.stock_after < 0 {
            return Err(DomainError::invariant("stock cannot go negative"));
        }
        if !self.movement_type.accepts(self.quantity_change) {
            return Err(DomainError::invariant(format!(
                "{} movement cannot change stock by {}",
                self.movement_type.as_str(),
                self.quantity_change
            )));
        }
        Ok(())
    }
}
