use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::instrument;

use vevurn_core::{SaleId, UserId};
use vevurn_events::{EventBus, EventEnvelope};
use vevurn_sales::{PosEvent, Sale, SaleVoided};

use super::stock::reverse_sale_effects;
use super::{EngineError, SaleEngine, TxOperation};
use crate::store::PosTransaction;

struct VoidSale<'a> {
    sale_id: SaleId,
    reason: &'a str,
    actor: UserId,
    now: DateTime<Utc>,
}

#[async_trait::async_trait]
impl TxOperation for VoidSale<'_> {
    type Output = Sale;

    fn name(&self) -> &'static str {
        "void_sale"
    }

    async fn run(&self, tx: &mut dyn PosTransaction) -> Result<Sale, EngineError> {
        let mut sale = tx
            .load_sale(self.sale_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("sale {}", self.sale_id)))?;

        sale.void(self.reason, self.actor, self.now)?;
        tx.update_sale_status(&sale).await?;
        reverse_sale_effects(tx, &sale, self.reason.trim(), Some(self.actor), self.now).await?;

        Ok(sale)
    }
}

impl<B> SaleEngine<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Void a completed sale: stock goes back, metrics are reversed and the
    /// payment is marked refunded.
    #[instrument(skip_all, fields(sale_id = %sale_id, actor = %actor), err)]
    pub async fn void_sale(&self, sale_id: SaleId, reason: &str, actor: UserId) -> Result<Sale, EngineError> {
        let now = Utc::now();
        let op = VoidSale {
            sale_id,
            reason,
            actor,
            now,
        };
        let sale = self.run_serializable(&op).await?;

        self.publish(&[PosEvent::SaleVoided(SaleVoided {
            sale_id: sale.id,
            receipt_number: sale.receipt_number.clone(),
            voided_by: actor,
            reason: sale.void_reason.clone().unwrap_or_default(),
            occurred_at: now,
        })]);
        tracing::info!(receipt = %sale.receipt_number, "sale voided");

        Ok(sale)
    }
}
