use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use vevurn_core::{AlertId, PaymentId, ProductId, SaleId};
use vevurn_inventory::{AlertStatus, InventoryMovement, ProductStock, StockAlert};
use vevurn_sales::{
    BusinessMetrics, DailyMetrics, HourlyMetrics, MobileMoneyPayment, MobileMoneyStatus, Sale,
};

use super::r#trait::{
    IDEMPOTENCY_KEY_CONSTRAINT, PRODUCT_SKU_CONSTRAINT, Pagination, PosStore, PosTransaction,
    RECEIPT_NUMBER_CONSTRAINT, SaleFilter, StoreError,
};

#[derive(Debug, Default, Clone)]
struct PosState {
    products: BTreeMap<ProductId, ProductStock>,
    sales: HashMap<SaleId, Sale>,
    /// Sale ids in insertion order.
    sale_log: Vec<SaleId>,
    idempotency_keys: HashMap<String, SaleId>,
    receipt_numbers: HashMap<String, SaleId>,
    movements: Vec<InventoryMovement>,
    alerts: HashMap<AlertId, StockAlert>,
    payments: HashMap<PaymentId, MobileMoneyPayment>,
    daily: BTreeMap<NaiveDate, DailyMetrics>,
    hourly: BTreeMap<(NaiveDate, u32), HourlyMetrics>,
}

impl PosState {
    fn open_alert_for(&self, product_id: ProductId) -> Option<&StockAlert> {
        self.alerts
            .values()
            .find(|a| a.product_id == product_id && a.status == AlertStatus::Open)
    }

    fn payment_by_reference(&self, reference: &str) -> Option<&MobileMoneyPayment> {
        self.payments.values().find(|p| p.reference == reference)
    }

    fn check_sku_free(&self, product: &ProductStock) -> Result<(), StoreError> {
        match self
            .products
            .values()
            .find(|p| p.sku == product.sku && p.id != product.id)
        {
            Some(existing) => Err(StoreError::UniqueViolation {
                constraint: PRODUCT_SKU_CONSTRAINT.to_string(),
                message: format!("sku {} already belongs to product {}", product.sku, existing.id),
            }),
            None => Ok(()),
        }
    }
}

/// In-memory POS store.
///
/// Intended for tests/dev. A transaction holds the single state lock for its
/// whole lifetime and works on a private copy that replaces the shared state
/// on commit, so transactions are trivially serializable.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPosStore {
    state: Arc<Mutex<PosState>>,
    injected_failures: Arc<AtomicU32>,
}

impl InMemoryPosStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with `SerializationFailure`.
    pub fn fail_next_commits(&self, n: u32) {
        self.injected_failures.store(n, Ordering::SeqCst);
    }

    /// Snapshot of every movement recorded so far, oldest first.
    pub async fn all_movements(&self) -> Vec<InventoryMovement> {
        self.state.lock().await.movements.clone()
    }

    pub async fn sale_count(&self) -> usize {
        self.state.lock().await.sales.len()
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<PosState>,
    work: PosState,
    injected_failures: Arc<AtomicU32>,
}

fn take_injected_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn missing(what: &str, id: impl core::fmt::Display) -> StoreError {
    StoreError::NotFound(format!("{what} {id}"))
}

#[async_trait::async_trait]
impl PosTransaction for InMemoryTransaction {
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<ProductStock>, StoreError> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .iter()
            .filter_map(|id| self.work.products.get(id).cloned())
            .collect())
    }

    async fn update_product_stock(&mut self, product: &ProductStock) -> Result<(), StoreError> {
        let row = self
            .work
            .products
            .get_mut(&product.id)
            .ok_or_else(|| missing("product", product.id))?;
        row.stock_quantity = product.stock_quantity;
        row.version = product.version;
        row.updated_at = product.updated_at;
        Ok(())
    }

    async fn insert_product(&mut self, product: &ProductStock) -> Result<(), StoreError> {
        self.work.check_sku_free(product)?;
        if self.work.products.contains_key(&product.id) {
            return Err(StoreError::UniqueViolation {
                constraint: "products_pkey".to_string(),
                message: format!("product {} already exists", product.id),
            });
        }
        self.work.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn find_sale_by_idempotency_key(&mut self, key: &str) -> Result<Option<Sale>, StoreError> {
        Ok(self
            .work
            .idempotency_keys
            .get(key)
            .and_then(|id| self.work.sales.get(id))
            .cloned())
    }

    async fn insert_sale(&mut self, sale: &Sale) -> Result<(), StoreError> {
        if let Some(key) = &sale.idempotency_key {
            if self.work.idempotency_keys.contains_key(key) {
                return Err(StoreError::UniqueViolation {
                    constraint: IDEMPOTENCY_KEY_CONSTRAINT.to_string(),
                    message: format!("idempotency key '{key}' already used"),
                });
            }
        }
        if self
            .work
            .receipt_numbers
            .contains_key(sale.receipt_number.as_str())
        {
            return Err(StoreError::UniqueViolation {
                constraint: RECEIPT_NUMBER_CONSTRAINT.to_string(),
                message: format!("receipt number {} already used", sale.receipt_number),
            });
        }

        if let Some(key) = &sale.idempotency_key {
            self.work.idempotency_keys.insert(key.clone(), sale.id);
        }
        self.work
            .receipt_numbers
            .insert(sale.receipt_number.as_str().to_string(), sale.id);
        self.work.sale_log.push(sale.id);
        self.work.sales.insert(sale.id, sale.clone());
        Ok(())
    }

    async fn load_sale(&mut self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        Ok(self.work.sales.get(&id).cloned())
    }

    async fn update_sale_status(&mut self, sale: &Sale) -> Result<(), StoreError> {
        let row = self
            .work
            .sales
            .get_mut(&sale.id)
            .ok_or_else(|| missing("sale", sale.id))?;
        row.status = sale.status;
        row.payment_status = sale.payment_status;
        row.updated_at = sale.updated_at;
        row.voided_at = sale.voided_at;
        row.voided_by = sale.voided_by;
        row.void_reason = sale.void_reason.clone();
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &InventoryMovement) -> Result<(), StoreError> {
        self.work.movements.push(movement.clone());
        Ok(())
    }

    async fn open_alert_for(&mut self, product_id: ProductId) -> Result<Option<StockAlert>, StoreError> {
        Ok(self.work.open_alert_for(product_id).cloned())
    }

    async fn insert_alert(&mut self, alert: &StockAlert) -> Result<(), StoreError> {
        if self.work.open_alert_for(alert.product_id).is_some() {
            return Err(StoreError::UniqueViolation {
                constraint: "stock_alerts_one_open_per_product".to_string(),
                message: format!("product {} already has an open alert", alert.product_id),
            });
        }
        self.work.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn update_alert(&mut self, alert: &StockAlert) -> Result<(), StoreError> {
        let row = self
            .work
            .alerts
            .get_mut(&alert.id)
            .ok_or_else(|| missing("alert", alert.id))?;
        *row = alert.clone();
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &MobileMoneyPayment) -> Result<(), StoreError> {
        if self.work.payment_by_reference(&payment.reference).is_some() {
            return Err(StoreError::UniqueViolation {
                constraint: "mobile_money_payments_reference_key".to_string(),
                message: format!("payment reference {} already used", payment.reference),
            });
        }
        self.work.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment(&mut self, payment: &MobileMoneyPayment) -> Result<(), StoreError> {
        let row = self
            .work
            .payments
            .get_mut(&payment.id)
            .ok_or_else(|| missing("payment", payment.id))?;
        *row = payment.clone();
        Ok(())
    }

    async fn payment_by_reference(&mut self, reference: &str) -> Result<Option<MobileMoneyPayment>, StoreError> {
        Ok(self.work.payment_by_reference(reference).cloned())
    }

    async fn payment_for_sale(&mut self, sale_id: SaleId) -> Result<Option<MobileMoneyPayment>, StoreError> {
        Ok(self
            .work
            .payments
            .values()
            .find(|p| p.sale_id == sale_id)
            .cloned())
    }

    async fn apply_metrics(
        &mut self,
        date: NaiveDate,
        hour: u32,
        delta: &BusinessMetrics,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let day = self
            .work
            .daily
            .entry(date)
            .or_insert_with(|| DailyMetrics::empty(date, now));
        day.metrics
            .apply(delta)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        day.updated_at = now;

        let slot = self
            .work
            .hourly
            .entry((date, hour))
            .or_insert_with(|| HourlyMetrics::empty(date, hour, now));
        slot.metrics
            .apply(delta)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        slot.updated_at = now;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction {
            mut guard,
            work,
            injected_failures,
        } = *self;
        if take_injected_failure(&injected_failures) {
            return Err(StoreError::SerializationFailure(
                "injected serialization failure".to_string(),
            ));
        }
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl PosStore for InMemoryPosStore {
    async fn begin(&self) -> Result<Box<dyn PosTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            work,
            injected_failures: self.injected_failures.clone(),
        }))
    }

    async fn upsert_product(&self, product: &ProductStock) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.check_sku_free(product)?;
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductStock>, StoreError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        Ok(self.state.lock().await.sales.get(&id).cloned())
    }

    async fn find_sale_by_idempotency_key(&self, key: &str) -> Result<Option<Sale>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .idempotency_keys
            .get(key)
            .and_then(|id| state.sales.get(id))
            .cloned())
    }

    async fn list_sales(&self, filter: &SaleFilter, page: Pagination) -> Result<Vec<Sale>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .sale_log
            .iter()
            .rev()
            .filter_map(|id| state.sales.get(id))
            .filter(|s| filter.matches(s))
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn daily_metrics(&self, date: NaiveDate) -> Result<Option<DailyMetrics>, StoreError> {
        Ok(self.state.lock().await.daily.get(&date).cloned())
    }

    async fn hourly_metrics(&self, date: NaiveDate) -> Result<Vec<HourlyMetrics>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .hourly
            .range((date, 0)..=(date, 23))
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn open_alerts(&self) -> Result<Vec<StockAlert>, StoreError> {
        let state = self.state.lock().await;
        let mut alerts: Vec<StockAlert> = state
            .alerts
            .values()
            .filter(|a| a.status == AlertStatus::Open)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(alerts)
    }

    async fn movements_for_product(
        &self,
        product_id: ProductId,
        page: Pagination,
    ) -> Result<Vec<InventoryMovement>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .movements
            .iter()
            .rev()
            .filter(|m| m.product_id == product_id)
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<MobileMoneyPayment>, StoreError> {
        Ok(self.state.lock().await.payment_by_reference(reference).cloned())
    }

    async fn expired_pending_payments(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<MobileMoneyPayment>, StoreError> {
        let state = self.state.lock().await;
        let mut expired: Vec<MobileMoneyPayment> = state
            .payments
            .values()
            .filter(|p| p.status == MobileMoneyStatus::Pending && p.expires_at <= now)
            .cloned()
            .collect();
        expired.sort_by_key(|p| p.expires_at);
        expired.truncate(limit as usize);
        Ok(expired)
    }
}
