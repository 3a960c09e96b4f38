//! Line pricing and sale totals.
//!
//! `subtotal = Σ unit_price × qty`, `taxable = subtotal − discount`,
//! `tax = taxable × vat_rate_bps / 10 000` (half up), `total = taxable + tax`.

use serde::{Deserialize, Serialize};

use vevurn_core::{DomainError, Money, ProductId};
use vevurn_inventory::ProductStock;

use crate::payment::PaymentMethod;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

/// Cash handed over and change returned (cash sales only).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tender {
    pub amount_tendered: Option<Money>,
    pub change_due: Option<Money>,
}

/// Price a line from the catalog row (never from client input).
pub fn price_line(product: &ProductStock, quantity: i64) -> Result<PricedLine, DomainError> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    let line_total = product.unit_price.checked_mul(quantity)?;
    Ok(PricedLine {
        product_id: product.id,
        sku: product.sku.clone(),
        name: product.name.clone(),
        quantity,
        unit_price: product.unit_price,
        line_total,
    })
}

pub fn compute_totals(
    lines: &[PricedLine],
    discount: Money,
    vat_rate_bps: u32,
) -> Result<SaleTotals, DomainError> {
    if discount.is_negative() {
        return Err(DomainError::validation("discount cannot be negative"));
    }

    let subtotal = lines
        .iter()
        .try_fold(Money::ZERO, |acc, l| acc.checked_add(l.line_total))?;

    if discount > subtotal {
        return Err(DomainError::validation(format!(
            "discount {discount} exceeds subtotal {subtotal}"
        )));
    }

    let taxable = subtotal.checked_sub(discount)?;
    let tax = taxable.percent_bps(vat_rate_bps)?;
    let total = taxable.checked_add(tax)?;

    Ok(SaleTotals {
        subtotal,
        discount,
        tax,
        total,
    })
}

/// Check the tender against the final total and work out change.
pub fn settle_tender(payment: &PaymentMethod, total: Money) -> Result<Tender, DomainError> {
    match payment {
        PaymentMethod::Cash { tendered } => {
            if *tendered < total {
                return Err(DomainError::validation(format!(
                    "tendered amount {tendered} is less than total {total}"
                )));
            }
            Ok(Tender {
                amount_tendered: Some(*tendered),
                change_due: Some(tendered.checked_sub(total)?),
            })
        }
        _ => Ok(Tender::default()),
    }
}
