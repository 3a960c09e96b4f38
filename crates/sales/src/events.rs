use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vevurn_core::{Money, PaymentId, ProductId, SaleId, UserId};
use vevurn_events::Event;
use vevurn_inventory::AlertSeverity;

use crate::payment::{MobileMoneyProvider, MobileMoneyStatus, PaymentKind};
use crate::receipt::ReceiptNumber;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecorded {
    pub sale_id: SaleId,
    pub receipt_number: ReceiptNumber,
    pub cashier_id: UserId,
    pub total: Money,
    pub payment_kind: PaymentKind,
    pub items_sold: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleVoided {
    pub sale_id: SaleId,
    pub receipt_number: ReceiptNumber,
    pub voided_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSettled {
    pub sale_id: SaleId,
    pub payment_id: PaymentId,
    pub reference: String,
    pub status: MobileMoneyStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLow {
    pub product_id: ProductId,
    pub sku: String,
    pub severity: AlertSeverity,
    pub stock_quantity: i64,
    pub min_stock_level: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileMoneyRequested {
    pub sale_id: SaleId,
    pub payment_id: PaymentId,
    pub provider: MobileMoneyProvider,
    pub amount: Money,
    pub reference: String,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Facts published once the producing transaction has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PosEvent {
    SaleRecorded(SaleRecorded),
    SaleVoided(SaleVoided),
    PaymentSettled(PaymentSettled),
    StockLow(StockLow),
    MobileMoneyRequested(MobileMoneyRequested),
}

impl Event for PosEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PosEvent::SaleRecorded(_) => "sale.recorded",
            PosEvent::SaleVoided(_) => "sale.voided",
            PosEvent::PaymentSettled(_) => "sale.payment_settled",
            PosEvent::StockLow(_) => "inventory.stock_low",
            PosEvent::MobileMoneyRequested(_) => "payment.mobile_money_requested",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PosEvent::SaleRecorded(e) => e.occurred_at,
            PosEvent::SaleVoided(e) => e.occurred_at,
            PosEvent::PaymentSettled(e) => e.occurred_at,
            PosEvent::StockLow(e) => e.occurred_at,
            PosEvent::MobileMoneyRequested(e) => e.occurred_at,
        }
    }

    fn subject_id(&self) -> Uuid {
        match self {
            PosEvent::SaleRecorded(e) => e.sale_id.into(),
            PosEvent::SaleVoided(e) => e.sale_id.into(),
            PosEvent::PaymentSettled(e) => e.sale_id.into(),
            PosEvent::StockLow(e) => e.product_id.into(),
            PosEvent::MobileMoneyRequested(e) => e.payment_id.into(),
        }
    }

    fn subject_type(&self) -> &'static str {
        match self {
            PosEvent::StockLow(_) => "product",
            PosEvent::MobileMoneyRequested(_) => "payment",
            _ => "sale",
        }
    }
}
