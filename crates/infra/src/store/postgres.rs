//! Postgres-backed POS store.
//!
//! Every transaction runs at `SERIALIZABLE` isolation. Product rows are locked
//! with `SELECT … FOR UPDATE` in id order so concurrent checkouts touching the
//! same products queue up instead of deadlocking.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (serialization failure) | `40001` | `SerializationFailure` |
//! | Database (deadlock detected) | `40P01` | `SerializationFailure` |
//! | Database (unique violation) | `23505` | `UniqueViolation` (constraint name kept) |
//! | Database (other) | Any other | `Backend` |
//! | RowNotFound | N/A | `NotFound` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use vevurn_core::{AlertId, CustomerId, Money, MovementId, PaymentId, ProductId, SaleId, SaleItemId, UserId};
use vevurn_inventory::{InventoryMovement, ProductStock, StockAlert};
use vevurn_sales::{
    BusinessMetrics, DailyMetrics, HourlyMetrics, MobileMoneyPayment, ReceiptNumber, Sale, SaleItem,
};

use super::r#trait::{Pagination, PosStore, PosTransaction, SaleFilter, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_pos_schema.sql");

const PRODUCT_COLUMNS: &str =
    "id, sku, name, unit_price, stock_quantity, min_stock_level, active, version, updated_at";

const SALE_COLUMNS: &str = "id, receipt_number, transaction_hash, cashier_id, customer_id, status, \
     payment_status, payment_method, subtotal, discount, tax, total, amount_tendered, change_due, \
     currency, idempotency_key, notes, business_date, business_hour, created_at, updated_at, \
     voided_at, voided_by, void_reason";

const MOVEMENT_COLUMNS: &str = "id, product_id, movement_type, quantity_change, stock_before, \
     stock_after, reference, reason, created_by, created_at";

const ALERT_COLUMNS: &str = "id, product_id, sku, severity, stock_quantity, min_stock_level, \
     status, created_at, updated_at, resolved_at";

const PAYMENT_COLUMNS: &str = "id, sale_id, provider, phone, amount, currency, reference, status, \
     provider_transaction_id, failure_reason, expires_at, created_at, updated_at";

const METRIC_COLUMNS: [&str; 10] = [
    "sales_count",
    "items_sold",
    "gross_revenue",
    "discount_total",
    "tax_total",
    "cash_total",
    "mobile_money_total",
    "card_total",
    "bank_transfer_total",
    "credit_total",
];

/// Postgres-backed POS store.
///
/// Uses the SQLx connection pool, which is `Send + Sync` and cheap to clone.
#[derive(Debug, Clone)]
pub struct PostgresPosStore {
    pool: Arc<PgPool>,
}

impl PostgresPosStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

/// An open `SERIALIZABLE` transaction.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl PosTransaction for PostgresTransaction {
    #[instrument(skip(self, ids), fields(product_count = ids.len()), err)]
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<ProductStock>, StoreError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    async fn update_product_stock(&mut self, product: &ProductStock) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE products SET stock_quantity = $2, version = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(product.id.as_uuid())
        .bind(product.stock_quantity)
        .bind(product.version as i64)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_product_stock", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("product {}", product.id)));
        }
        Ok(())
    }

    #[instrument(skip(self, product), fields(product_id = %product.id, sku = %product.sku), err)]
    async fn insert_product(&mut self, product: &ProductStock) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.unit_price.amount())
        .bind(product.stock_quantity)
        .bind(product.min_stock_level)
        .bind(product.active)
        .bind(product.version as i64)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn find_sale_by_idempotency_key(&mut self, key: &str) -> Result<Option<Sale>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE idempotency_key = $1"))
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_sale_by_idempotency_key", e))?;

        match row {
            Some(row) => {
                let mut sale = sale_from_row(&row)?;
                sale.items = fetch_items(&mut *self.tx, sale.id).await?;
                Ok(Some(sale))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, sale), fields(sale_id = %sale.id, receipt = %sale.receipt_number), err)]
    async fn insert_sale(&mut self, sale: &Sale) -> Result<(), StoreError> {
        let payment_method = serde_json::to_value(&sale.payment_method)
            .map_err(|e| StoreError::Backend(format!("payment method serialization failed: {e}")))?;

        sqlx::query(&format!(
            "INSERT INTO sales ({SALE_COLUMNS}, payment_kind) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, \
              $19, $20, $21, $22, $23, $24, $25)"
        ))
        .bind(sale.id.as_uuid())
        .bind(sale.receipt_number.as_str())
        .bind(&sale.transaction_hash)
        .bind(sale.cashier_id.as_uuid())
        .bind(sale.customer_id.map(Uuid::from))
        .bind(sale.status.as_str())
        .bind(sale.payment_status.as_str())
        .bind(&payment_method)
        .bind(sale.subtotal.amount())
        .bind(sale.discount.amount())
        .bind(sale.tax.amount())
        .bind(sale.total.amount())
        .bind(sale.amount_tendered.map(Money::amount))
        .bind(sale.change_due.map(Money::amount))
        .bind(&sale.currency)
        .bind(sale.idempotency_key.as_deref())
        .bind(sale.notes.as_deref())
        .bind(sale.business_date)
        .bind(sale.business_hour as i32)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .bind(sale.voided_at)
        .bind(sale.voided_by.map(Uuid::from))
        .bind(sale.void_reason.as_deref())
        .bind(sale.payment_method.kind().as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_sale", e))?;

        for (position, item) in sale.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO sale_items \
                 (id, sale_id, position, product_id, sku, name, quantity, unit_price, line_total) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(item.id.as_uuid())
            .bind(sale.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_uuid())
            .bind(&item.sku)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price.amount())
            .bind(item.line_total.amount())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_sale_item", e))?;
        }

        Ok(())
    }

    async fn load_sale(&mut self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = $1 FOR UPDATE"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_sale", e))?;

        match row {
            Some(row) => {
                let mut sale = sale_from_row(&row)?;
                sale.items = fetch_items(&mut *self.tx, sale.id).await?;
                Ok(Some(sale))
            }
            None => Ok(None),
        }
    }

    async fn update_sale_status(&mut self, sale: &Sale) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE sales SET status = $2, payment_status = $3, updated_at = $4, \
             voided_at = $5, voided_by = $6, void_reason = $7 WHERE id = $1",
        )
        .bind(sale.id.as_uuid())
        .bind(sale.status.as_str())
        .bind(sale.payment_status.as_str())
        .bind(sale.updated_at)
        .bind(sale.voided_at)
        .bind(sale.voided_by.map(Uuid::from))
        .bind(sale.void_reason.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_sale_status", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("sale {}", sale.id)));
        }
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &InventoryMovement) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO inventory_movements ({MOVEMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(movement.id.as_uuid())
        .bind(movement.product_id.as_uuid())
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity_change)
        .bind(movement.stock_before)
        .bind(movement.stock_after)
        .bind(movement.reference.as_deref())
        .bind(movement.reason.as_deref())
        .bind(movement.created_by.map(Uuid::from))
        .bind(movement.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;
        Ok(())
    }

    async fn open_alert_for(&mut self, product_id: ProductId) -> Result<Option<StockAlert>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM stock_alerts \
             WHERE product_id = $1 AND status = 'open' FOR UPDATE"
        ))
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("open_alert_for", e))?;

        row.as_ref().map(alert_from_row).transpose()
    }

    async fn insert_alert(&mut self, alert: &StockAlert) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO stock_alerts ({ALERT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(alert.id.as_uuid())
        .bind(alert.product_id.as_uuid())
        .bind(&alert.sku)
        .bind(alert.severity.as_str())
        .bind(alert.stock_quantity)
        .bind(alert.min_stock_level)
        .bind(alert.status.as_str())
        .bind(alert.created_at)
        .bind(alert.updated_at)
        .bind(alert.resolved_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_alert", e))?;
        Ok(())
    }

    async fn update_alert(&mut self, alert: &StockAlert) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE stock_alerts SET severity = $2, stock_quantity = $3, min_stock_level = $4, \
             status = $5, updated_at = $6, resolved_at = $7 WHERE id = $1",
        )
        .bind(alert.id.as_uuid())
        .bind(alert.severity.as_str())
        .bind(alert.stock_quantity)
        .bind(alert.min_stock_level)
        .bind(alert.status.as_str())
        .bind(alert.updated_at)
        .bind(alert.resolved_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_alert", e))?;
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &MobileMoneyPayment) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO mobile_money_payments ({PAYMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(payment.id.as_uuid())
        .bind(payment.sale_id.as_uuid())
        .bind(payment.provider.as_str())
        .bind(&payment.phone)
        .bind(payment.amount.amount())
        .bind(&payment.currency)
        .bind(&payment.reference)
        .bind(payment.status.as_str())
        .bind(payment.provider_transaction_id.as_deref())
        .bind(payment.failure_reason.as_deref())
        .bind(payment.expires_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_payment", e))?;
        Ok(())
    }

    async fn update_payment(&mut self, payment: &MobileMoneyPayment) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE mobile_money_payments SET status = $2, provider_transaction_id = $3, \
             failure_reason = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(payment.provider_transaction_id.as_deref())
        .bind(payment.failure_reason.as_deref())
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_payment", e))?;
        Ok(())
    }

    async fn payment_by_reference(&mut self, reference: &str) -> Result<Option<MobileMoneyPayment>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM mobile_money_payments WHERE reference = $1 FOR UPDATE"
        ))
        .bind(reference)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("payment_by_reference", e))?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn payment_for_sale(&mut self, sale_id: SaleId) -> Result<Option<MobileMoneyPayment>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM mobile_money_payments WHERE sale_id = $1 FOR UPDATE"
        ))
        .bind(sale_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("payment_for_sale", e))?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn apply_metrics(
        &mut self,
        date: NaiveDate,
        hour: u32,
        delta: &BusinessMetrics,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let values = metric_values(delta);
        let daily_sql = upsert_metrics_sql("daily_metrics", &["business_date"]);
        let hourly_sql = upsert_metrics_sql("hourly_metrics", &["business_date", "hour"]);

        let mut daily = sqlx::query(&daily_sql).bind(date);
        for v in values {
            daily = daily.bind(v);
        }
        daily
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("apply_daily_metrics", e))?;

        let mut hourly = sqlx::query(&hourly_sql)
            .bind(date)
            .bind(hour as i32);
        for v in values {
            hourly = hourly.bind(v);
        }
        hourly
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("apply_hourly_metrics", e))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait::async_trait]
impl PosStore for PostgresPosStore {
    async fn begin(&self) -> Result<Box<dyn PosTransaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation_level", e))?;

        Ok(Box::new(PostgresTransaction { tx }))
    }

    #[instrument(skip(self, product), fields(product_id = %product.id, sku = %product.sku), err)]
    async fn upsert_product(&self, product: &ProductStock) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET sku = EXCLUDED.sku, name = EXCLUDED.name, \
             unit_price = EXCLUDED.unit_price, stock_quantity = EXCLUDED.stock_quantity, \
             min_stock_level = EXCLUDED.min_stock_level, active = EXCLUDED.active, \
             version = EXCLUDED.version, updated_at = EXCLUDED.updated_at"
        ))
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.unit_price.amount())
        .bind(product.stock_quantity)
        .bind(product.min_stock_level)
        .bind(product.active)
        .bind(product.version as i64)
        .bind(product.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_product", e))?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductStock>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_sale", e))?;

        match row {
            Some(row) => {
                let mut sale = sale_from_row(&row)?;
                sale.items = fetch_items(&*self.pool, sale.id).await?;
                Ok(Some(sale))
            }
            None => Ok(None),
        }
    }

    async fn find_sale_by_idempotency_key(&self, key: &str) -> Result<Option<Sale>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE idempotency_key = $1"))
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_sale_by_idempotency_key", e))?;

        match row {
            Some(row) => {
                let mut sale = sale_from_row(&row)?;
                sale.items = fetch_items(&*self.pool, sale.id).await?;
                Ok(Some(sale))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(sale_count = tracing::field::Empty), err)]
    async fn list_sales(&self, filter: &SaleFilter, page: Pagination) -> Result<Vec<Sale>, StoreError> {
        let span = Span::current();

        let rows = sqlx::query(&format!(
            "SELECT {SALE_COLUMNS} FROM sales \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR cashier_id = $2) \
               AND ($3::date IS NULL OR business_date = $3) \
               AND ($4::timestamptz IS NULL OR created_at >= $4) \
               AND ($5::timestamptz IS NULL OR created_at < $5) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $6 OFFSET $7"
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.cashier_id.map(Uuid::from))
        .bind(filter.business_date)
        .bind(filter.created_after)
        .bind(filter.created_before)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_sales", e))?;

        let mut sales = rows.iter().map(sale_from_row).collect::<Result<Vec<_>, _>>()?;
        for sale in &mut sales {
            sale.items = fetch_items(&*self.pool, sale.id).await?;
        }

        span.record("sale_count", sales.len());
        Ok(sales)
    }

    async fn daily_metrics(&self, date: NaiveDate) -> Result<Option<DailyMetrics>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT business_date, {}, updated_at FROM daily_metrics WHERE business_date = $1",
            METRIC_COLUMNS.join(", ")
        ))
        .bind(date)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("daily_metrics", e))?;

        row.map(|row| {
            Ok(DailyMetrics {
                date: get(&row, "business_date")?,
                metrics: metrics_from_row(&row)?,
                updated_at: get(&row, "updated_at")?,
            })
        })
        .transpose()
    }

    async fn hourly_metrics(&self, date: NaiveDate) -> Result<Vec<HourlyMetrics>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT business_date, hour, {}, updated_at FROM hourly_metrics \
             WHERE business_date = $1 ORDER BY hour",
            METRIC_COLUMNS.join(", ")
        ))
        .bind(date)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("hourly_metrics", e))?;

        rows.iter()
            .map(|row| {
                let hour: i32 = get(row, "hour")?;
                Ok(HourlyMetrics {
                    date: get(row, "business_date")?,
                    hour: u32::try_from(hour)
                        .map_err(|_| StoreError::Backend(format!("invalid hour {hour}")))?,
                    metrics: metrics_from_row(row)?,
                    updated_at: get(row, "updated_at")?,
                })
            })
            .collect()
    }

    async fn open_alerts(&self) -> Result<Vec<StockAlert>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM stock_alerts WHERE status = 'open' \
             ORDER BY CASE severity WHEN 'out_of_stock' THEN 0 WHEN 'critical' THEN 1 ELSE 2 END, \
             created_at"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("open_alerts", e))?;

        rows.iter().map(alert_from_row).collect()
    }

    async fn movements_for_product(
        &self,
        product_id: ProductId,
        page: Pagination,
    ) -> Result<Vec<InventoryMovement>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements WHERE product_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(product_id.as_uuid())
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("movements_for_product", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<MobileMoneyPayment>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM mobile_money_payments WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("payment_by_reference", e))?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn expired_pending_payments(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<MobileMoneyPayment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM mobile_money_payments \
             WHERE status = 'pending' AND expires_at <= $1 ORDER BY expires_at LIMIT $2"
        ))
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("expired_pending_payments", e))?;

        rows.iter().map(payment_from_row).collect()
    }
}

/// `INSERT … ON CONFLICT DO UPDATE` that adds the delta onto the stored row.
fn upsert_metrics_sql(table: &str, keys: &[&str]) -> String {
    let columns: Vec<&str> = keys.iter().copied().chain(METRIC_COLUMNS).chain(["updated_at"]).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    let updates: Vec<String> = METRIC_COLUMNS
        .iter()
        .map(|c| format!("{c} = {table}.{c} + EXCLUDED.{c}"))
        .chain(["updated_at = EXCLUDED.updated_at".to_string()])
        .collect();

    format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
        columns.join(", "),
        placeholders.join(", "),
        keys.join(", "),
        updates.join(", ")
    )
}

fn metric_values(m: &BusinessMetrics) -> [i64; 10] {
    [
        m.sales_count,
        m.items_sold,
        m.gross_revenue.amount(),
        m.discount_total.amount(),
        m.tax_total.amount(),
        m.cash_total.amount(),
        m.mobile_money_total.amount(),
        m.card_total.amount(),
        m.bank_transfer_total.amount(),
        m.credit_total.amount(),
    ]
}

async fn fetch_items<'e, E>(executor: E, sale_id: SaleId) -> Result<Vec<SaleItem>, StoreError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query(
        "SELECT id, sale_id, product_id, sku, name, quantity, unit_price, line_total \
         FROM sale_items WHERE sale_id = $1 ORDER BY position",
    )
    .bind(*sale_id.as_uuid())
    .fetch_all(executor)
    .await
    .map_err(|e| map_sqlx_error("fetch_sale_items", e))?;

    rows.iter()
        .map(|row| {
            Ok(SaleItem {
                id: SaleItemId::from_uuid(get(row, "id")?),
                sale_id: SaleId::from_uuid(get(row, "sale_id")?),
                product_id: ProductId::from_uuid(get(row, "product_id")?),
                sku: get(row, "sku")?,
                name: get(row, "name")?,
                quantity: get(row, "quantity")?,
                unit_price: Money::new(get(row, "unit_price")?),
                line_total: Money::new(get(row, "line_total")?),
            })
        })
        .collect()
}

// Row mapping

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to decode column {column}: {e}")))
}

fn parse<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    let raw: String = get(row, column)?;
    raw.parse()
        .map_err(|e| StoreError::Backend(format!("invalid value in column {column}: {e}")))
}

fn product_from_row(row: &PgRow) -> Result<ProductStock, StoreError> {
    let version: i64 = get(row, "version")?;
    Ok(ProductStock {
        id: ProductId::from_uuid(get(row, "id")?),
        sku: get(row, "sku")?,
        name: get(row, "name")?,
        unit_price: Money::new(get(row, "unit_price")?),
        stock_quantity: get(row, "stock_quantity")?,
        min_stock_level: get(row, "min_stock_level")?,
        active: get(row, "active")?,
        version: version.max(0) as u64,
        updated_at: get(row, "updated_at")?,
    })
}

/// Sale header; `items` is filled by the caller.
fn sale_from_row(row: &PgRow) -> Result<Sale, StoreError> {
    let receipt: String = get(row, "receipt_number")?;
    let payment_method: serde_json::Value = get(row, "payment_method")?;
    let business_hour: i32 = get(row, "business_hour")?;

    Ok(Sale {
        id: SaleId::from_uuid(get(row, "id")?),
        receipt_number: ReceiptNumber::parse(&receipt).map_err(|e| StoreError::Backend(e.to_string()))?,
        transaction_hash: get(row, "transaction_hash")?,
        cashier_id: UserId::from_uuid(get(row, "cashier_id")?),
        customer_id: get::<Option<Uuid>>(row, "customer_id")?.map(CustomerId::from_uuid),
        status: parse(row, "status")?,
        payment_status: parse(row, "payment_status")?,
        payment_method: serde_json::from_value(payment_method)
            .map_err(|e| StoreError::Backend(format!("invalid payment_method: {e}")))?,
        subtotal: Money::new(get(row, "subtotal")?),
        discount: Money::new(get(row, "discount")?),
        tax: Money::new(get(row, "tax")?),
        total: Money::new(get(row, "total")?),
        amount_tendered: get::<Option<i64>>(row, "amount_tendered")?.map(Money::new),
        change_due: get::<Option<i64>>(row, "change_due")?.map(Money::new),
        currency: get(row, "currency")?,
        items: Vec::new(),
        idempotency_key: get(row, "idempotency_key")?,
        notes: get(row, "notes")?,
        business_date: get(row, "business_date")?,
        business_hour: u32::try_from(business_hour)
            .map_err(|_| StoreError::Backend(format!("invalid business_hour {business_hour}")))?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        voided_at: get(row, "voided_at")?,
        voided_by: get::<Option<Uuid>>(row, "voided_by")?.map(UserId::from_uuid),
        void_reason: get(row, "void_reason")?,
    })
}

fn movement_from_row(row: &PgRow) -> Result<InventoryMovement, StoreError> {
    Ok(InventoryMovement {
        id: MovementId::from_uuid(get(row, "id")?),
        product_id: ProductId::from_uuid(get(row, "product_id")?),
        movement_type: parse(row, "movement_type")?,
        quantity_change: get(row, "quantity_change")?,
        stock_before: get(row, "stock_before")?,
        stock_after: get(row, "stock_after")?,
        reference: get(row, "reference")?,
        reason: get(row, "reason")?,
        created_by: get::<Option<Uuid>>(row, "created_by")?.map(UserId::from_uuid),
        created_at: get(row, "created_at")?,
    })
}

fn alert_from_row(row: &PgRow) -> Result<StockAlert, StoreError> {
    Ok(StockAlert {
        id: AlertId::from_uuid(get(row, "id")?),
        product_id: ProductId::from_uuid(get(row, "product_id")?),
        sku: get(row, "sku")?,
        severity: parse(row, "severity")?,
        stock_quantity: get(row, "stock_quantity")?,
        min_stock_level: get(row, "min_stock_level")?,
        status: parse(row, "status")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        resolved_at: get(row, "resolved_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<MobileMoneyPayment, StoreError> {
    Ok(MobileMoneyPayment {
        id: PaymentId::from_uuid(get(row, "id")?),
        sale_id: SaleId::from_uuid(get(row, "sale_id")?),
        provider: parse(row, "provider")?,
        phone: get(row, "phone")?,
        amount: Money::new(get(row, "amount")?),
        currency: get(row, "currency")?,
        reference: get(row, "reference")?,
        status: parse(row, "status")?,
        provider_transaction_id: get(row, "provider_transaction_id")?,
        failure_reason: get(row, "failure_reason")?,
        expires_at: get(row, "expires_at")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn metrics_from_row(row: &PgRow) -> Result<BusinessMetrics, StoreError> {
    Ok(BusinessMetrics {
        sales_count: get(row, "sales_count")?,
        items_sold: get(row, "items_sold")?,
        gross_revenue: Money::new(get(row, "gross_revenue")?),
        discount_total: Money::new(get(row, "discount_total")?),
        tax_total: Money::new(get(row, "tax_total")?),
        cash_total: Money::new(get(row, "cash_total")?),
        mobile_money_total: Money::new(get(row, "mobile_money_total")?),
        card_total: Money::new(get(row, "card_total")?),
        bank_transfer_total: Money::new(get(row, "bank_transfer_total")?),
        credit_total: Money::new(get(row, "credit_total")?),
    })
}

/// Map a SQLx error to a `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // serialization_failure / deadlock_detected
                Some("40001") | Some("40P01") => StoreError::SerializationFailure(msg),
                Some("23505") => StoreError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or_default().to_string(),
                    message: msg,
                },
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("row not found in {}", operation)),
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_upsert_adds_deltas() {
        let sql = upsert_metrics_sql("hourly_metrics", &["business_date", "hour"]);
        assert!(sql.starts_with(
            "INSERT INTO hourly_metrics (business_date, hour, sales_count, items_sold,"
        ));
        assert!(sql.contains("$13)"));
        assert!(sql.contains("ON CONFLICT (business_date, hour) DO UPDATE SET"));
        assert!(sql.contains("sales_count = hourly_metrics.sales_count + EXCLUDED.sales_count"));
        assert!(sql.ends_with("updated_at = EXCLUDED.updated_at"));
    }

    #[test]
    fn schema_declares_the_constraints_the_engine_relies_on() {
        for name in [
            crate::store::IDEMPOTENCY_KEY_CONSTRAINT,
            crate::store::RECEIPT_NUMBER_CONSTRAINT,
            "stock_alerts_one_open_per_product",
        ] {
            assert!(SCHEMA.contains(name), "missing {name}");
        }
    }
}
