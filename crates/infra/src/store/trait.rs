use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vevurn_core::{ProductId, SaleId, UserId};
use vevurn_inventory::{InventoryMovement, ProductStock, StockAlert};
use vevurn_sales::{
    BusinessMetrics, DailyMetrics, HourlyMetrics, MobileMoneyPayment, Sale, SaleStatus,
};

/// Name of the unique constraint guarding `sales.idempotency_key`.
pub const IDEMPOTENCY_KEY_CONSTRAINT: &str = "sales_idempotency_key_key";

/// Name of the unique constraint guarding `sales.receipt_number`.
pub const RECEIPT_NUMBER_CONSTRAINT: &str = "sales_receipt_number_key";

/// Name of the unique constraint guarding `products.sku`.
pub const PRODUCT_SKU_CONSTRAINT: &str = "products_sku_key";

/// Store operation error.
///
/// Infrastructure errors only; business rule failures are decided in the
/// engine before anything is written.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The database aborted the transaction to keep it serializable
    /// (Postgres `40001`, or deadlock `40P01`). Safe to retry from scratch.
    #[error("serialization failure: {0}")]
    SerializationFailure(String),

    #[error("unique constraint '{constraint}' violated: {message}")]
    UniqueViolation { constraint: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::SerializationFailure(_))
    }

    pub fn is_unique_violation_of(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint, .. } if constraint == name)
    }
}

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).clamp(1, 500),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter for sale listings. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleFilter {
    pub status: Option<SaleStatus>,
    pub cashier_id: Option<UserId>,
    pub business_date: Option<NaiveDate>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl SaleFilter {
    pub fn matches(&self, sale: &Sale) -> bool {
        self.status.is_none_or(|s| s == sale.status)
            && self.cashier_id.is_none_or(|c| c == sale.cashier_id)
            && self.business_date.is_none_or(|d| d == sale.business_date)
            && self.created_after.is_none_or(|t| sale.created_at >= t)
            && self.created_before.is_none_or(|t| sale.created_at < t)
    }
}

/// One serializable unit of work.
///
/// Every mutation of sales, stock, alerts, payments and metrics goes through
/// a transaction. Nothing is visible to other transactions until `commit`;
/// dropping a transaction without committing discards it.
#[async_trait::async_trait]
pub trait PosTransaction: Send {
    /// Lock the given products for update, in ascending id order.
    /// Unknown ids are simply absent from the result.
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<ProductStock>, StoreError>;

    async fn update_product_stock(&mut self, product: &ProductStock) -> Result<(), StoreError>;

    /// Add a new catalog row. A taken sku fails with a `UniqueViolation` of
    /// [`PRODUCT_SKU_CONSTRAINT`].
    async fn insert_product(&mut self, product: &ProductStock) -> Result<(), StoreError>;

    async fn find_sale_by_idempotency_key(&mut self, key: &str) -> Result<Option<Sale>, StoreError>;

    /// Insert a sale together with its line items.
    async fn insert_sale(&mut self, sale: &Sale) -> Result<(), StoreError>;

    /// Load a sale and lock it for update.
    async fn load_sale(&mut self, id: SaleId) -> Result<Option<Sale>, StoreError>;

    /// Persist status, payment status and void fields of an existing sale.
    async fn update_sale_status(&mut self, sale: &Sale) -> Result<(), StoreError>;

    async fn insert_movement(&mut self, movement: &InventoryMovement) -> Result<(), StoreError>;

    async fn open_alert_for(&mut self, product_id: ProductId) -> Result<Option<StockAlert>, StoreError>;

    async fn insert_alert(&mut self, alert: &StockAlert) -> Result<(), StoreError>;

    async fn update_alert(&mut self, alert: &StockAlert) -> Result<(), StoreError>;

    async fn insert_payment(&mut self, payment: &MobileMoneyPayment) -> Result<(), StoreError>;

    async fn update_payment(&mut self, payment: &MobileMoneyPayment) -> Result<(), StoreError>;

    /// Load a mobile-money payment by its external reference and lock it.
    async fn payment_by_reference(&mut self, reference: &str) -> Result<Option<MobileMoneyPayment>, StoreError>;

    async fn payment_for_sale(&mut self, sale_id: SaleId) -> Result<Option<MobileMoneyPayment>, StoreError>;

    /// Add `delta` to the daily row for `date` and the hourly row for `(date, hour)`.
    async fn apply_metrics(
        &mut self,
        date: NaiveDate,
        hour: u32,
        delta: &BusinessMetrics,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Point-of-sale persistence boundary.
///
/// ## Implementation Requirements
///
/// - `begin()` must give SERIALIZABLE isolation: the outcome of concurrent
///   transactions equals some serial order, or one of them fails with
///   `StoreError::SerializationFailure`
/// - `sales.idempotency_key` and `sales.receipt_number` are unique
/// - at most one open alert per product
#[async_trait::async_trait]
pub trait PosStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn PosTransaction>, StoreError>;

    /// Insert or replace a catalog row (seeding and catalog sync).
    async fn upsert_product(&self, product: &ProductStock) -> Result<(), StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductStock>, StoreError>;

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError>;

    async fn find_sale_by_idempotency_key(&self, key: &str) -> Result<Option<Sale>, StoreError>;

    /// Newest first.
    async fn list_sales(&self, filter: &SaleFilter, page: Pagination) -> Result<Vec<Sale>, StoreError>;

    async fn daily_metrics(&self, date: NaiveDate) -> Result<Option<DailyMetrics>, StoreError>;

    /// Hour rows that exist for `date`, ordered by hour.
    async fn hourly_metrics(&self, date: NaiveDate) -> Result<Vec<HourlyMetrics>, StoreError>;

    /// Open alerts, most severe first.
    async fn open_alerts(&self) -> Result<Vec<StockAlert>, StoreError>;

    /// Newest first.
    async fn movements_for_product(
        &self,
        product_id: ProductId,
        page: Pagination,
    ) -> Result<Vec<InventoryMovement>, StoreError>;

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<MobileMoneyPayment>, StoreError>;

    /// Pending payments whose `expires_at <= now`, oldest first.
    async fn expired_pending_payments(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<MobileMoneyPayment>, StoreError>;
}
