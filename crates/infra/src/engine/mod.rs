//! Sale transaction engine (application-level orchestration).
//!
//! Every state change of the point of sale runs through [`SaleEngine`]. Each
//! operation is a [`TxOperation`]: a piece of decision logic that reads and
//! writes through one `PosTransaction`, and is executed by
//! [`SaleEngine::run_serializable`].
//!
//! ## Execution Flow
//!
//! ```text
//! Request
//!   ↓
//! 1. Validate (pure, no IO)
//!   ↓
//! 2. Allocate receipt number (outside the transaction; gaps are fine)
//!   ↓
//! 3. BEGIN SERIALIZABLE
//!      lock products → price → insert sale → stock + movements
//!      → alerts → mobile-money payment → metrics
//!    COMMIT   (serialization failure → retry from step 3)
//!   ↓
//! 4. Publish events, dispatch mobile-money request
//! ```
//!
//! ## Consistency
//!
//! Nothing here takes a lock or keeps a cache. Two checkouts racing for the
//! last unit are resolved by the store's isolation: one commits, the other
//! either sees the reduced stock or fails with `SerializationFailure` and is
//! retried against fresh state, up to `max_attempts` times.
//!
//! Side effects that cannot be rolled back (events, the provider call) only
//! happen after commit.

mod checkout;
mod settlement;
mod stock;
mod void;

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{Span, instrument};

use vevurn_core::{DomainError, ProductId, SaleId};
use vevurn_events::{EventBus, EventEnvelope};
use vevurn_inventory::{InventoryMovement, ProductStock, StockAlert, StockError};
use vevurn_sales::{BusinessClock, DailyMetrics, HourlyMetrics, MobileMoneyPayment, PosEvent, Sale};

use crate::mobile_money::MobileMoneyGateway;
use crate::sequence::{ReceiptNumberAllocator, SequenceError};
use crate::store::{PRODUCT_SKU_CONSTRAINT, Pagination, PosStore, PosTransaction, SaleFilter, StoreError};

pub use settlement::Settlement;
pub use stock::{NewProduct, StockAdjustment};

/// Engine settings, usually derived from `PosConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// VAT in basis points (1800 = 18 %).
    pub vat_rate_bps: u32,
    pub clock: BusinessClock,
    /// Attempts per operation, the first one included.
    pub max_attempts: u32,
    /// Sleep before the first retry; doubled on every further retry.
    pub retry_backoff: Duration,
    /// How long a mobile-money request may stay pending.
    pub mobile_money_ttl: chrono::Duration,
    pub currency: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vat_rate_bps: 1_800,
            clock: BusinessClock::utc(),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(25),
            mobile_money_ttl: chrono::Duration::minutes(5),
            currency: "RWF".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient stock for {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        sku: String,
        requested: i64,
        available: i64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// The record exists but is in a state that does not allow the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Serialization failures persisted through every attempt.
    #[error("transaction gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Turn a violated sku constraint into a `Conflict` naming the sku.
    fn or_sku_conflict(self, sku: &str) -> Self {
        match self {
            EngineError::Store(err) if err.is_unique_violation_of(PRODUCT_SKU_CONSTRAINT) => {
                EngineError::Conflict(format!("sku {sku} is already in use"))
            }
            other => other,
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => EngineError::Validation(msg),
            DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::InvariantViolation(msg) => EngineError::InvalidState(msg),
            DomainError::Conflict(msg) => EngineError::Conflict(msg),
            err @ DomainError::Overflow(_) => EngineError::Validation(err.to_string()),
        }
    }
}

impl From<StockError> for EngineError {
    fn from(value: StockError) -> Self {
        match value {
            StockError::Insufficient {
                product_id,
                sku,
                requested,
                available,
            } => EngineError::InsufficientStock {
                product_id,
                sku,
                requested,
                available,
            },
            StockError::Inactive { sku, .. } => {
                EngineError::Validation(format!("product {sku} is not for sale"))
            }
            StockError::Domain(err) => err.into(),
        }
    }
}

/// Result of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub sale: Sale,
    /// Alerts raised or worsened by this sale.
    pub low_stock_alerts: Vec<StockAlert>,
    pub mobile_money: Option<MobileMoneyPayment>,
    /// `true` when the idempotency key matched an earlier sale and nothing
    /// was written.
    pub replayed: bool,
}

/// A unit of decision logic executed inside one serializable transaction.
///
/// `run` may be called several times for one request (retries), so it must
/// derive everything it writes from what it reads through `tx`.
#[async_trait::async_trait]
pub trait TxOperation: Send + Sync {
    type Output: Send;

    fn name(&self) -> &'static str;

    async fn run(&self, tx: &mut dyn PosTransaction) -> Result<Self::Output, EngineError>;
}

pub struct SaleEngine<B> {
    store: Arc<dyn PosStore>,
    receipts: ReceiptNumberAllocator,
    gateway: Arc<dyn MobileMoneyGateway>,
    bus: B,
    config: EngineConfig,
}

impl<B> SaleEngine<B> {
    pub fn new(
        store: Arc<dyn PosStore>,
        receipts: ReceiptNumberAllocator,
        gateway: Arc<dyn MobileMoneyGateway>,
        bus: B,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            receipts,
            gateway,
            bus,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PosStore> {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> SaleEngine<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `op` in a fresh serializable transaction, retrying on
    /// serialization failures with exponential backoff.
    ///
    /// Any error from `op` rolls the transaction back. Only
    /// `StoreError::SerializationFailure` is retried.
    #[instrument(skip_all, fields(operation = op.name(), attempts = tracing::field::Empty), err)]
    pub async fn run_serializable<O>(&self, op: &O) -> Result<O::Output, EngineError>
    where
        O: TxOperation,
    {
        let span = Span::current();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            span.record("attempts", attempt);

            let result = match self.store.begin().await {
                Ok(mut tx) => match op.run(tx.as_mut()).await {
                    Ok(output) => tx.commit().await.map(|()| output).map_err(EngineError::from),
                    Err(err) => {
                        if let Err(rollback_err) = tx.rollback().await {
                            tracing::warn!(error = %rollback_err, "rollback failed");
                        }
                        Err(err)
                    }
                },
                Err(err) => Err(EngineError::from(err)),
            };

            match result {
                Err(EngineError::Store(err)) if err.is_retryable() => {
                    if attempt >= max_attempts {
                        tracing::warn!(attempt, error = %err, "giving up after serialization failures");
                        return Err(EngineError::RetriesExhausted { attempts: attempt });
                    }
                    let backoff = self
                        .config
                        .retry_backoff
                        .saturating_mul(1u32 << (attempt - 1).min(10));
                    tracing::debug!(attempt, ?backoff, error = %err, "serialization failure, retrying");
                    tokio::time::sleep(backoff).await;
                }
                other => return other,
            }
        }
    }

    /// Publish committed facts. Failures are logged: the facts are already
    /// durable and consumers can catch up from the store.
    fn publish(&self, events: &[PosEvent]) {
        for event in events {
            let envelope = match EventEnvelope::from_event(event) {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::error!(error = %err, "failed to serialize event");
                    continue;
                }
            };
            let event_type = envelope.event_type().to_string();
            if let Err(err) = self.bus.publish(envelope) {
                tracing::warn!(event_type, error = ?err, "event publish failed");
            }
        }
    }

    // Read side

    pub async fn sale(&self, id: SaleId) -> Result<Sale, EngineError> {
        self.store
            .get_sale(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("sale {id}")))
    }

    pub async fn sales(&self, filter: &SaleFilter, page: Pagination) -> Result<Vec<Sale>, EngineError> {
        Ok(self.store.list_sales(filter, page).await?)
    }

    pub async fn product(&self, id: ProductId) -> Result<ProductStock, EngineError> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("product {id}")))
    }

    /// Metrics for a business date; a day without sales reads as zeros.
    pub async fn daily_metrics(&self, date: NaiveDate) -> Result<DailyMetrics, EngineError> {
        Ok(self
            .store
            .daily_metrics(date)
            .await?
            .unwrap_or_else(|| DailyMetrics::empty(date, Utc::now())))
    }

    pub async fn hourly_metrics(&self, date: NaiveDate) -> Result<Vec<HourlyMetrics>, EngineError> {
        Ok(self.store.hourly_metrics(date).await?)
    }

    pub async fn open_alerts(&self) -> Result<Vec<StockAlert>, EngineError> {
        Ok(self.store.open_alerts().await?)
    }

    pub async fn movements(
        &self,
        product_id: ProductId,
        page: Pagination,
    ) -> Result<Vec<InventoryMovement>, EngineError> {
        Ok(self.store.movements_for_product(product_id, page).await?)
    }

    pub async fn payment(&self, reference: &str) -> Result<MobileMoneyPayment, EngineError> {
        self.store
            .payment_by_reference(reference)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("payment {reference}")))
    }

    /// Seed or replace a catalog row.
    #[instrument(skip(self, product), fields(product_id = %product.id, sku = %product.sku), err)]
    pub async fn upsert_product(&self, product: ProductStock) -> Result<ProductStock, EngineError> {
        product.validate()?;
        self.store
            .upsert_product(&product)
            .await
            .map_err(|err| EngineError::from(err).or_sku_conflict(&product.sku))?;
        Ok(product)
    }
}
