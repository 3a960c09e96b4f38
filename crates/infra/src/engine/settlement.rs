//! Mobile-money settlement: provider callbacks and the expiry sweep.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::instrument;

use vevurn_events::{EventBus, EventEnvelope};
use vevurn_sales::{MobileMoneyPayment, MobileMoneyStatus, PaymentOutcome, PaymentSettled, PosEvent, Sale};

use super::stock::reverse_sale_effects;
use super::{EngineError, SaleEngine, TxOperation};
use crate::store::PosTransaction;

/// Upper bound on payments expired per sweep.
const EXPIRY_BATCH: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub payment: MobileMoneyPayment,
    pub sale: Sale,
    /// `false` when the payment was already final and nothing changed.
    pub changed: bool,
}

struct Settle<'a> {
    reference: &'a str,
    outcome: &'a PaymentOutcome,
    now: DateTime<Utc>,
}

#[async_trait::async_trait]
impl TxOperation for Settle<'_> {
    type Output = Settlement;

    fn name(&self) -> &'static str {
        "settle_mobile_money"
    }

    async fn run(&self, tx: &mut dyn PosTransaction) -> Result<Settlement, EngineError> {
        let mut payment = tx
            .payment_by_reference(self.reference)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("payment {}", self.reference)))?;
        let mut sale = tx
            .load_sale(payment.sale_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("sale {}", payment.sale_id)))?;

        if !payment.settle(self.outcome, self.now) {
            return Ok(Settlement {
                payment,
                sale,
                changed: false,
            });
        }

        if payment.status == MobileMoneyStatus::Successful {
            sale.confirm_payment(self.now)?;
            tx.update_sale_status(&sale).await?;
        } else {
            sale.cancel_for_failed_payment(self.now)?;
            tx.update_sale_status(&sale).await?;
            let reason = match payment.status {
                MobileMoneyStatus::Expired => "mobile money payment expired",
                _ => "mobile money payment failed",
            };
            reverse_sale_effects(tx, &sale, reason, None, self.now).await?;
        }
        tx.update_payment(&payment).await?;

        Ok(Settlement {
            payment,
            sale,
            changed: true,
        })
    }
}

impl<B> SaleEngine<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Apply a provider verdict. Settling a payment that is already final
    /// returns it unchanged.
    #[instrument(skip(self, outcome), err)]
    pub async fn settle_mobile_money(
        &self,
        reference: &str,
        outcome: PaymentOutcome,
    ) -> Result<Settlement, EngineError> {
        self.settle_at(reference, &outcome, Utc::now()).await
    }

    /// Expire every pending payment whose deadline has passed, restoring the
    /// stock and metrics of its sale. Returns the payments that changed.
    #[instrument(skip(self), fields(expired = tracing::field::Empty), err)]
    pub async fn expire_pending_payments(&self, now: DateTime<Utc>) -> Result<Vec<Settlement>, EngineError> {
        let due = self.store.expired_pending_payments(now, EXPIRY_BATCH).await?;

        let mut expired = Vec::with_capacity(due.len());
        for payment in due {
            match self.settle_at(&payment.reference, &PaymentOutcome::Expired, now).await {
                Ok(settlement) if settlement.changed => expired.push(settlement),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(reference = %payment.reference, error = %err, "failed to expire payment");
                }
            }
        }

        tracing::Span::current().record("expired", expired.len());
        Ok(expired)
    }

    async fn settle_at(
        &self,
        reference: &str,
        outcome: &PaymentOutcome,
        now: DateTime<Utc>,
    ) -> Result<Settlement, EngineError> {
        let op = Settle {
            reference,
            outcome,
            now,
        };
        let settlement = self.run_serializable(&op).await?;

        if settlement.changed {
            let payment = &settlement.payment;
            self.publish(&[PosEvent::PaymentSettled(PaymentSettled {
                sale_id: payment.sale_id,
                payment_id: payment.id,
                reference: payment.reference.clone(),
                status: payment.status,
                occurred_at: now,
            })]);
            tracing::info!(
                reference = %payment.reference,
                status = payment.status.as_str(),
                sale_status = settlement.sale.status.as_str(),
                "mobile money payment settled"
            );
        }

        Ok(settlement)
    }
}
