use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use vevurn_core::{CustomerId, DomainError, DomainResult, Money, ProductId, SaleId, SaleItemId, UserId};

use crate::metrics::BusinessMetrics;
use crate::payment::{PaymentKind, PaymentMethod, PaymentStatus};
use crate::pricing::{PricedLine, SaleTotals, Tender};
use crate::receipt::{ReceiptNumber, compute_transaction_hash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Completed,
    /// Mobile money requested, waiting for the provider callback.
    PendingPayment,
    /// Mobile money failed or expired; stock and metrics were reversed.
    Cancelled,
    Voided,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Completed => "completed",
            SaleStatus::PendingPayment => "pending_payment",
            SaleStatus::Cancelled => "cancelled",
            SaleStatus::Voided => "voided",
        }
    }
}

impl FromStr for SaleStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(SaleStatus::Completed),
            "pending_payment" => Ok(SaleStatus::PendingPayment),
            "cancelled" => Ok(SaleStatus::Cancelled),
            "voided" => Ok(SaleStatus::Voided),
            other => Err(DomainError::validation(format!("unknown sale status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: SaleItemId,
    pub sale_id: SaleId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

/// Everything checkout has decided about a sale before it is recorded.
#[derive(Debug, Clone)]
pub struct NewSale {
    pub receipt_number: ReceiptNumber,
    pub cashier_id: UserId,
    pub customer_id: Option<CustomerId>,
    pub payment_method: PaymentMethod,
    pub lines: Vec<PricedLine>,
    pub totals: SaleTotals,
    pub tender: Tender,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    pub currency: String,
    pub business_date: NaiveDate,
    pub business_hour: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: SaleId,
    pub receipt_number: ReceiptNumber,
    pub transaction_hash: String,
    pub cashier_id: UserId,
    pub customer_id: Option<CustomerId>,
    pub status: SaleStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
    pub amount_tendered: Option<Money>,
    pub change_due: Option<Money>,
    pub currency: String,
    pub items: Vec<SaleItem>,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    /// Metric buckets the sale was counted in; reversals hit the same ones.
    pub business_date: NaiveDate,
    pub business_hour: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub voided_at: Option<DateTime<Utc>>,
    pub voided_by: Option<UserId>,
    pub void_reason: Option<String>,
}

impl Sale {
    pub fn record(new: NewSale) -> DomainResult<Sale> {
        if new.lines.is_empty() {
            return Err(DomainError::validation("a sale needs at least one line"));
        }
        if new.business_hour > 23 {
            return Err(DomainError::validation("business hour must be within 0..=23"));
        }

        let id = SaleId::new();
        let items: Vec<SaleItem> = new
            .lines
            .into_iter()
            .map(|line| SaleItem {
                id: SaleItemId::new(),
                sale_id: id,
                product_id: line.product_id,
                sku: line.sku,
                name: line.name,
                quantity: line.quantity,
                unit_price: line.unit_price,
                line_total: line.line_total,
            })
            .collect();

        let (status, payment_status) = match new.payment_method.kind() {
            PaymentKind::MobileMoney => (SaleStatus::PendingPayment, PaymentStatus::Pending),
            PaymentKind::Credit => (SaleStatus::Completed, PaymentStatus::Outstanding),
            PaymentKind::Cash | PaymentKind::Card | PaymentKind::BankTransfer => {
                (SaleStatus::Completed, PaymentStatus::Paid)
            }
        };

        let transaction_hash = compute_transaction_hash(
            id,
            &new.receipt_number,
            new.cashier_id,
            new.created_at,
            new.totals.total,
            &items,
        );

        let sale = Sale {
            id,
            receipt_number: new.receipt_number,
            transaction_hash,
            cashier_id: new.cashier_id,
            customer_id: new.customer_id,
            status,
            payment_status,
            payment_method: new.payment_method,
            subtotal: new.totals.subtotal,
            discount: new.totals.discount,
            tax: new.totals.tax,
            total: new.totals.total,
            amount_tendered: new.tender.amount_tendered,
            change_due: new.tender.change_due,
            currency: new.currency,
            items,
            idempotency_key: new.idempotency_key,
            notes: new.notes,
            business_date: new.business_date,
            business_hour: new.business_hour,
            created_at: new.created_at,
            updated_at: new.created_at,
            voided_at: None,
            voided_by: None,
            void_reason: None,
        };
        sale.check()?;
        Ok(sale)
    }

    /// Internal consistency of the recorded amounts.
    pub fn check(&self) -> DomainResult<()> {
        let lines = self
            .items
            .iter()
            .try_fold(Money::ZERO, |acc, i| acc.checked_add(i.line_total))?;
        if lines != self.subtotal {
            return Err(DomainError::invariant("line totals do not add up to subtotal"));
        }
        let expected = self
            .subtotal
            .checked_sub(self.discount)?
            .checked_add(self.tax)?;
        if expected != self.total {
            return Err(DomainError::invariant("total does not match subtotal - discount + tax"));
        }
        Ok(())
    }

    pub fn items_sold(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// What this sale adds to the business metrics.
    pub fn metrics_delta(&self) -> BusinessMetrics {
        BusinessMetrics::for_sale(self)
    }

    pub fn verify_hash(&self) -> bool {
        compute_transaction_hash(
            self.id,
            &self.receipt_number,
            self.cashier_id,
            self.created_at,
            self.total,
            &self.items,
        ) == self.transaction_hash
    }

    /// Whether the sale's stock and metrics effects are still in force.
    pub fn is_effective(&self) -> bool {
        matches!(self.status, SaleStatus::Completed | SaleStatus::PendingPayment)
    }

    pub fn void(&mut self, reason: &str, actor: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("void reason is required"));
        }
        if self.status != SaleStatus::Completed {
            return Err(DomainError::conflict(format!(
                "only completed sales can be voided (sale {} is {})",
                self.receipt_number,
                self.status.as_str()
            )));
        }
        self.status = SaleStatus::Voided;
        self.payment_status = PaymentStatus::Refunded;
        self.voided_at = Some(now);
        self.voided_by = Some(actor);
        self.void_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    pub fn confirm_payment(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.expect_pending()?;
        self.status = SaleStatus::Completed;
        self.payment_status = PaymentStatus::Paid;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel_for_failed_payment(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.expect_pending()?;
        self.status = SaleStatus::Cancelled;
        self.payment_status = PaymentStatus::Failed;
        self.updated_at = now;
        Ok(())
    }

    fn expect_pending(&self) -> DomainResult<()> {
        if self.status != SaleStatus::PendingPayment {
            return Err(DomainError::conflict(format!(
                "sale {} is not awaiting payment (status {})",
                self.receipt_number,
                self.status.as_str()
            )));
        }
        Ok(())
    }
}
