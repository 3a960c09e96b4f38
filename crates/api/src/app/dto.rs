use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use vevurn_core::{CustomerId, Money, UserId};
use vevurn_infra::{Pagination, SaleFilter};
use vevurn_inventory::MovementType;
use vevurn_sales::{CartLine, CheckoutRequest, PaymentMethod, PaymentOutcome, SaleStatus};

// -------------------------
// Request DTOs
// -------------------------

/// Checkout body as sent by the till. The cashier comes from the token.
#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub lines: Vec<CartLine>,
    pub payment: PaymentMethod,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CheckoutBody {
    /// The `Idempotency-Key` header wins over a key in the body.
    pub fn into_request(self, cashier_id: UserId, header_key: Option<String>) -> CheckoutRequest {
        CheckoutRequest {
            lines: self.lines,
            payment: self.payment,
            discount: self.discount,
            customer_id: self.customer_id,
            cashier_id,
            idempotency_key: header_key.or(self.idempotency_key),
            notes: self.notes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VoidSaleRequest {
    pub reason: String,
}

/// Provider callback: `{"reference": "...", "status": "successful", ...}`.
#[derive(Debug, Deserialize)]
pub struct MobileMoneyCallback {
    pub reference: String,
    #[serde(flatten)]
    pub outcome: PaymentOutcome,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub unit_price: Money,
    /// Opening stock, recorded as a restock movement.
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default)]
    pub min_stock_level: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
    #[serde(default = "default_movement_type")]
    pub movement_type: MovementType,
    #[serde(default)]
    pub reason: Option<String>,
}

fn default_movement_type() -> MovementType {
    MovementType::Adjustment
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PageQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.offset)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListSalesQuery {
    pub status: Option<SaleStatus>,
    pub cashier_id: Option<UserId>,
    pub date: Option<NaiveDate>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListSalesQuery {
    pub fn filter(&self) -> SaleFilter {
        SaleFilter {
            status: self.status,
            cashier_id: self.cashier_id,
            business_date: self.date,
            created_after: self.from,
            created_before: self.to,
        }
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.offset)
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub limit: u32,
    pub offset: u32,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>, page: Pagination) -> Self {
        Self {
            items,
            limit: page.limit,
            offset: page.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn callback_body_flattens_the_outcome() {
        let body: MobileMoneyCallback = serde_json::from_value(json!({
            "reference": "RCP-20260301-000004",
            "status": "successful",
            "provider_transaction_id": "MTN-123",
        }))
        .unwrap();
        assert_eq!(body.reference, "RCP-20260301-000004");
        assert_eq!(
            body.outcome,
            PaymentOutcome::Successful {
                provider_transaction_id: "MTN-123".to_string()
            }
        );

        let expired: MobileMoneyCallback =
            serde_json::from_value(json!({"reference": "RCP-20260301-000005", "status": "expired"})).unwrap();
        assert_eq!(expired.outcome, PaymentOutcome::Expired);
    }

    #[test]
    fn header_idempotency_key_wins() {
        let body: CheckoutBody = serde_json::from_value(json!({
            "lines": [],
            "payment": {"type": "credit"},
            "idempotency_key": "from-body-0001",
        }))
        .unwrap();
        let req = body.into_request(UserId::new(), Some("from-header-01".to_string()));
        assert_eq!(req.idempotency_key.as_deref(), Some("from-header-01"));
        assert_eq!(req.discount, Money::ZERO);
    }

    #[test]
    fn adjustment_is_the_default_movement() {
        let body: AdjustStockRequest = serde_json::from_value(json!({"delta": -2, "reason": "broken"})).unwrap();
        assert_eq!(body.movement_type, MovementType::Adjustment);
    }
}
