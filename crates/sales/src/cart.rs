use serde::{Deserialize, Serialize};

use vevurn_core::{CustomerId, DomainError, Money, ProductId, UserId};

use crate::payment::PaymentMethod;

/// Upper bound on a single line's quantity (guards against fat-finger input).
pub const MAX_LINE_QUANTITY: i64 = 10_000;

/// Upper bound on distinct lines per checkout.
pub const MAX_LINES: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Raw checkout input as received from the till.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub lines: Vec<CartLine>,
    pub payment: PaymentMethod,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    pub cashier_id: UserId,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A checkout that passed every check that needs no database access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCheckout {
    /// Merged lines, one per product, in first-seen order.
    pub lines: Vec<CartLine>,
    pub payment: PaymentMethod,
    pub discount: Money,
    pub customer_id: Option<CustomerId>,
    pub cashier_id: UserId,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
}

impl ValidatedCheckout {
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.lines.iter().map(|l| l.product_id).collect()
    }
}

fn validate_idempotency_key(key: &str) -> Result<(), DomainError> {
    if !(8..=128).contains(&key.len()) {
        return Err(DomainError::validation(
            "idempotency key must be between 8 and 128 characters",
        ));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DomainError::validation(
            "idempotency key may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

impl CheckoutRequest {
    pub fn validate(self) -> Result<ValidatedCheckout, DomainError> {
        if self.lines.is_empty() {
            return Err(DomainError::validation("cart is empty"));
        }

        let mut merged: Vec<CartLine> = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "quantity for product {} must be positive",
                    line.product_id
                )));
            }
            match merged.iter_mut().find(|m| m.product_id == line.product_id) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
                None => merged.push(line.clone()),
            }
        }

        if merged.len() > MAX_LINES {
            return Err(DomainError::validation(format!(
                "cart cannot have more than {MAX_LINES} lines"
            )));
        }
        if let Some(line) = merged.iter().find(|l| l.quantity > MAX_LINE_QUANTITY) {
            return Err(DomainError::validation(format!(
                "quantity for product {} exceeds {MAX_LINE_QUANTITY}",
                line.product_id
            )));
        }

        if self.discount.is_negative() {
            return Err(DomainError::validation("discount cannot be negative"));
        }

        let idempotency_key = self
            .idempotency_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if let Some(key) = &idempotency_key {
            validate_idempotency_key(key)?;
        }

        let payment = self.payment.normalized(self.customer_id)?;

        let notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(ValidatedCheckout {
            lines: merged,
            payment,
            discount: self.discount,
            customer_id: self.customer_id,
            cashier_id: self.cashier_id,
            idempotency_key,
            notes,
        })
    }
}
