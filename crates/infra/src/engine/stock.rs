//! Stock mutations shared by every operation, and manual stock adjustment.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::instrument;

use vevurn_core::{ProductId, UserId};
use vevurn_events::{EventBus, EventEnvelope};
use vevurn_inventory::{
    AlertDecision, InventoryMovement, MovementType, ProductStock, StockAlert, StockChange,
    evaluate_alert,
};
use vevurn_sales::{PosEvent, Sale, StockLow};

use super::{EngineError, SaleEngine, TxOperation};
use crate::store::PosTransaction;

/// Persist a stock change already applied to `product`: the product row,
/// its movement record and the alert re-evaluation.
///
/// Returns the alert when this change raised or worsened one.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn record_stock_change(
    tx: &mut dyn PosTransaction,
    product: &ProductStock,
    change: &StockChange,
    movement_type: MovementType,
    reference: Option<String>,
    reason: Option<String>,
    actor: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<(InventoryMovement, Option<StockAlert>), EngineError> {
    let movement = InventoryMovement::record(change, movement_type, reference, reason, actor, now)?;

    tx.update_product_stock(product).await?;
    tx.insert_movement(&movement).await?;

    let open = tx.open_alert_for(product.id).await?;
    let decision = evaluate_alert(product, open.as_ref(), now);
    let notify = decision.notifiable(open.as_ref()).cloned();
    match decision {
        AlertDecision::Raise(alert) => tx.insert_alert(&alert).await?,
        AlertDecision::Refresh(alert) | AlertDecision::Resolve(alert) => tx.update_alert(&alert).await?,
        AlertDecision::Unchanged => {}
    }

    Ok((movement, notify))
}

/// Put a sale's items back on the shelf and take it out of the metrics.
///
/// Used by voids and by failed or expired mobile-money payments. The metric
/// reversal hits the buckets the sale was originally counted in.
pub(crate) async fn reverse_sale_effects(
    tx: &mut dyn PosTransaction,
    sale: &Sale,
    reason: &str,
    actor: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let mut ids: Vec<ProductId> = sale.items.iter().map(|i| i.product_id).collect();
    ids.sort();
    ids.dedup();

    let mut products = tx.lock_products(&ids).await?;

    for item in &sale.items {
        let product = products
            .iter_mut()
            .find(|p| p.id == item.product_id)
            .ok_or_else(|| EngineError::NotFound(format!("product {}", item.product_id)))?;

        let change = product.restore(item.quantity, now)?;
        record_stock_change(
            tx,
            product,
            &change,
            MovementType::SaleReversal,
            Some(sale.receipt_number.to_string()),
            Some(reason.to_string()),
            actor,
            now,
        )
        .await?;
    }

    tx.apply_metrics(
        sale.business_date,
        sale.business_hour,
        &sale.metrics_delta().negate(),
        now,
    )
    .await?;

    Ok(())
}

pub(crate) fn stock_low_event(alert: &StockAlert, now: DateTime<Utc>) -> PosEvent {
    PosEvent::StockLow(StockLow {
        product_id: alert.product_id,
        sku: alert.sku.clone(),
        severity: alert.severity,
        stock_quantity: alert.stock_quantity,
        min_stock_level: alert.min_stock_level,
        occurred_at: now,
    })
}

/// Result of a restock or manual correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockAdjustment {
    pub product: ProductStock,
    pub movement: InventoryMovement,
    pub alert: Option<StockAlert>,
}

struct AdjustStock<'a> {
    product_id: ProductId,
    delta: i64,
    movement_type: MovementType,
    reason: Option<&'a str>,
    actor: UserId,
    now: DateTime<Utc>,
}

#[async_trait::async_trait]
impl TxOperation for AdjustStock<'_> {
    type Output = StockAdjustment;

    fn name(&self) -> &'static str {
        "adjust_stock"
    }

    async fn run(&self, tx: &mut dyn PosTransaction) -> Result<StockAdjustment, EngineError> {
        let mut product = tx
            .lock_products(&[self.product_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::NotFound(format!("product {}", self.product_id)))?;

        let change = match self.movement_type {
            MovementType::Restock => product.restore(self.delta, self.now)?,
            MovementType::Adjustment => product.adjust(self.delta, self.now)?,
            MovementType::Sale | MovementType::SaleReversal => {
                return Err(EngineError::Validation(format!(
                    "{} movements are recorded by sales only",
                    self.movement_type.as_str()
                )));
            }
        };

        let (movement, alert) = record_stock_change(
            tx,
            &product,
            &change,
            self.movement_type,
            None,
            self.reason.map(str::to_string),
            Some(self.actor),
            self.now,
        )
        .await?;

        Ok(StockAdjustment {
            product,
            movement,
            alert,
        })
    }
}

/// A catalog entry created together with its opening stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProduct {
    pub product: ProductStock,
    /// Restock movement for the opening stock, absent when it was zero.
    pub opening_movement: Option<InventoryMovement>,
    pub alert: Option<StockAlert>,
}

struct CreateProduct<'a> {
    product: &'a ProductStock,
    opening_stock: i64,
    actor: UserId,
    now: DateTime<Utc>,
}

#[async_trait::async_trait]
impl TxOperation for CreateProduct<'_> {
    type Output = NewProduct;

    fn name(&self) -> &'static str {
        "create_product"
    }

    async fn run(&self, tx: &mut dyn PosTransaction) -> Result<NewProduct, EngineError> {
        let mut product = self.product.clone();
        tx.insert_product(&product).await?;

        if self.opening_stock == 0 {
            return Ok(NewProduct {
                product,
                opening_movement: None,
                alert: None,
            });
        }

        let change = product.restore(self.opening_stock, self.now)?;
        let (movement, alert) = record_stock_change(
            tx,
            &product,
            &change,
            MovementType::Restock,
            None,
            Some("opening stock".to_string()),
            Some(self.actor),
            self.now,
        )
        .await?;

        Ok(NewProduct {
            product,
            opening_movement: Some(movement),
            alert,
        })
    }
}

impl<B> SaleEngine<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Add a product and book its opening stock as a restock, in one
    /// transaction. A taken sku is a `Conflict`.
    #[instrument(
        skip_all,
        fields(product_id = %product.id, sku = %product.sku, opening_stock = opening_stock),
        err
    )]
    pub async fn create_product(
        &self,
        mut product: ProductStock,
        opening_stock: i64,
        actor: UserId,
    ) -> Result<NewProduct, EngineError> {
        if opening_stock < 0 {
            return Err(EngineError::Validation(
                "opening stock cannot be negative".to_string(),
            ));
        }

        let now = Utc::now();
        product.stock_quantity = 0;
        product.version = 0;
        product.updated_at = now;
        product.validate()?;

        let op = CreateProduct {
            product: &product,
            opening_stock,
            actor,
            now,
        };
        let created = self
            .run_serializable(&op)
            .await
            .map_err(|err| err.or_sku_conflict(&product.sku))?;

        if let Some(alert) = &created.alert {
            self.publish(&[stock_low_event(alert, now)]);
        }

        tracing::info!(stock = created.product.stock_quantity, "product created");
        Ok(created)
    }

    /// Restock (`delta > 0`) or correct (`delta` either sign) a product's stock.
    #[instrument(
        skip_all,
        fields(product_id = %product_id, delta = delta, movement_type = movement_type.as_str()),
        err
    )]
    pub async fn adjust_stock(
        &self,
        product_id: ProductId,
        delta: i64,
        movement_type: MovementType,
        reason: Option<&str>,
        actor: UserId,
    ) -> Result<StockAdjustment, EngineError> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if movement_type == MovementType::Adjustment && reason.is_none() {
            return Err(EngineError::Validation(
                "a reason is required for manual adjustments".to_string(),
            ));
        }

        let now = Utc::now();
        let op = AdjustStock {
            product_id,
            delta,
            movement_type,
            reason,
            actor,
            now,
        };
        let adjustment = self.run_serializable(&op).await?;

        if let Some(alert) = &adjustment.alert {
            self.publish(&[stock_low_event(alert, now)]);
        }

        tracing::info!(
            stock_after = adjustment.product.stock_quantity,
            "stock adjusted"
        );
        Ok(adjustment)
    }
}
