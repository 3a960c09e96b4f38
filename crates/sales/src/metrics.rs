//! Rolling business aggregates.
//!
//! A `BusinessMetrics` value is used both as a delta (what one sale adds or
//! takes away) and as the stored aggregate for a day or an hour. Aggregates
//! are maintained incrementally inside the sale transaction, so they always
//! equal the sum of the deltas of sales that are still in force.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use vevurn_core::{DomainError, DomainResult, Money};

use crate::payment::PaymentKind;
use crate::sale::Sale;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessMetrics {
    pub sales_count: i64,
    pub items_sold: i64,
    pub gross_revenue: Money,
    pub discount_total: Money,
    pub tax_total: Money,
    pub cash_total: Money,
    pub mobile_money_total: Money,
    pub card_total: Money,
    pub bank_transfer_total: Money,
    pub credit_total: Money,
}

impl BusinessMetrics {
    pub fn for_sale(sale: &Sale) -> Self {
        let mut delta = Self {
            sales_count: 1,
            items_sold: sale.items_sold(),
            gross_revenue: sale.total,
            discount_total: sale.discount,
            tax_total: sale.tax,
            ..Self::default()
        };
        let bucket = match sale.payment_method.kind() {
            PaymentKind::Cash => &mut delta.cash_total,
            PaymentKind::MobileMoney => &mut delta.mobile_money_total,
            PaymentKind::Card => &mut delta.card_total,
            PaymentKind::BankTransfer => &mut delta.bank_transfer_total,
            PaymentKind::Credit => &mut delta.credit_total,
        };
        *bucket = sale.total;
        delta
    }

    pub fn negate(&self) -> Self {
        Self {
            sales_count: -self.sales_count,
            items_sold: -self.items_sold,
            gross_revenue: self.gross_revenue.negate(),
            discount_total: self.discount_total.negate(),
            tax_total: self.tax_total.negate(),
            cash_total: self.cash_total.negate(),
            mobile_money_total: self.mobile_money_total.negate(),
            card_total: self.card_total.negate(),
            bank_transfer_total: self.bank_transfer_total.negate(),
            credit_total: self.credit_total.negate(),
        }
    }

    /// Add `delta` into this aggregate.
    pub fn apply(&mut self, delta: &BusinessMetrics) -> DomainResult<()> {
        let count = |a: i64, b: i64| {
            a.checked_add(b)
                .ok_or_else(|| DomainError::overflow("metrics counter"))
        };
        *self = Self {
            sales_count: count(self.sales_count, delta.sales_count)?,
            items_sold: count(self.items_sold, delta.items_sold)?,
            gross_revenue: self.gross_revenue.checked_add(delta.gross_revenue)?,
            discount_total: self.discount_total.checked_add(delta.discount_total)?,
            tax_total: self.tax_total.checked_add(delta.tax_total)?,
            cash_total: self.cash_total.checked_add(delta.cash_total)?,
            mobile_money_total: self.mobile_money_total.checked_add(delta.mobile_money_total)?,
            card_total: self.card_total.checked_add(delta.card_total)?,
            bank_transfer_total: self.bank_transfer_total.checked_add(delta.bank_transfer_total)?,
            credit_total: self.credit_total.checked_add(delta.credit_total)?,
        };
        Ok(())
    }

    /// Mean sale value, truncated; zero when nothing was sold.
    pub fn average_ticket(&self) -> Money {
        if self.sales_count <= 0 {
            return Money::ZERO;
        }
        Money::new(self.gross_revenue.amount() / self.sales_count)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub metrics: BusinessMetrics,
    pub updated_at: DateTime<Utc>,
}

impl DailyMetrics {
    pub fn empty(date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            date,
            metrics: BusinessMetrics::default(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyMetrics {
    pub date: NaiveDate,
    /// Hour of the business day, 0..=23.
    pub hour: u32,
    #[serde(flatten)]
    pub metrics: BusinessMetrics,
    pub updated_at: DateTime<Utc>,
}

impl HourlyMetrics {
    pub fn empty(date: NaiveDate, hour: u32, now: DateTime<Utc>) -> Self {
        Self {
            date,
            hour,
            metrics: BusinessMetrics::default(),
            updated_at: now,
        }
    }
}
