use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{Span, instrument};

use vevurn_core::ProductId;
use vevurn_events::{EventBus, EventEnvelope};
use vevurn_inventory::{MovementType, ProductStock};
use vevurn_sales::{
    CheckoutRequest, MobileMoneyPayment, MobileMoneyRequested, NewSale, PaymentMethod, PaymentOutcome,
    PosEvent, ReceiptNumber, Sale, SaleRecorded, ValidatedCheckout, compute_totals, price_line,
    settle_tender,
};

use super::stock::{record_stock_change, stock_low_event};
use super::{CheckoutReceipt, EngineConfig, EngineError, SaleEngine, TxOperation};
use crate::mobile_money::GatewayError;
use crate::store::{IDEMPOTENCY_KEY_CONSTRAINT, PosTransaction};

enum CheckoutOutcome {
    Recorded(CheckoutReceipt),
    /// Another request with the same idempotency key got there first.
    Existing(Sale),
}

struct Checkout<'a> {
    checkout: &'a ValidatedCheckout,
    receipt_number: &'a ReceiptNumber,
    config: &'a EngineConfig,
    now: DateTime<Utc>,
}

#[async_trait::async_trait]
impl TxOperation for Checkout<'_> {
    type Output = CheckoutOutcome;

    fn name(&self) -> &'static str {
        "checkout"
    }

    async fn run(&self, tx: &mut dyn PosTransaction) -> Result<CheckoutOutcome, EngineError> {
        let checkout = self.checkout;
        let now = self.now;

        if let Some(key) = checkout.idempotency_key.as_deref() {
            if let Some(existing) = tx.find_sale_by_idempotency_key(key).await? {
                return Ok(CheckoutOutcome::Existing(existing));
            }
        }

        let mut ids = checkout.product_ids();
        ids.sort();
        let mut products: HashMap<ProductId, ProductStock> = tx
            .lock_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut changes = Vec::with_capacity(checkout.lines.len());
        let mut lines = Vec::with_capacity(checkout.lines.len());
        for line in &checkout.lines {
            let product = products
                .get_mut(&line.product_id)
                .ok_or_else(|| EngineError::NotFound(format!("product {}", line.product_id)))?;
            changes.push(product.deduct(line.quantity, now)?);
            lines.push(price_line(product, line.quantity)?);
        }

        let totals = compute_totals(&lines, checkout.discount, self.config.vat_rate_bps)?;
        let tender = settle_tender(&checkout.payment, totals.total)?;

        let clock = self.config.clock;
        let sale = Sale::record(NewSale {
            receipt_number: self.receipt_number.clone(),
            cashier_id: checkout.cashier_id,
            customer_id: checkout.customer_id,
            payment_method: checkout.payment.clone(),
            lines,
            totals,
            tender,
            idempotency_key: checkout.idempotency_key.clone(),
            notes: checkout.notes.clone(),
            currency: self.config.currency.clone(),
            business_date: clock.date(now),
            business_hour: clock.hour(now),
            created_at: now,
        })?;
        tx.insert_sale(&sale).await?;

        let mut low_stock_alerts = Vec::new();
        for change in &changes {
            let product = products
                .get(&change.product_id)
                .ok_or_else(|| EngineError::NotFound(format!("product {}", change.product_id)))?;
            let (_, alert) = record_stock_change(
                tx,
                product,
                change,
                MovementType::Sale,
                Some(sale.receipt_number.to_string()),
                None,
                Some(sale.cashier_id),
                now,
            )
            .await?;
            low_stock_alerts.extend(alert);
        }

        let mobile_money = match &sale.payment_method {
            PaymentMethod::MobileMoney { provider, phone } => {
                let payment = MobileMoneyPayment::request(
                    sale.id,
                    *provider,
                    phone.clone(),
                    sale.total,
                    sale.currency.clone(),
                    sale.receipt_number.to_string(),
                    now,
                    self.config.mobile_money_ttl,
                );
                tx.insert_payment(&payment).await?;
                Some(payment)
            }
            _ => None,
        };

        tx.apply_metrics(sale.business_date, sale.business_hour, &sale.metrics_delta(), now)
            .await?;

        Ok(CheckoutOutcome::Recorded(CheckoutReceipt {
            sale,
            low_stock_alerts,
            mobile_money,
            replayed: false,
        }))
    }
}

impl<B> SaleEngine<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Record a sale: one serializable transaction covering the sale, its
    /// items, stock, movements, alerts, the mobile-money request and metrics.
    ///
    /// Repeating a request with the same idempotency key returns the
    /// original sale with `replayed = true`.
    #[instrument(
        skip_all,
        fields(
            cashier_id = %request.cashier_id,
            lines = request.lines.len(),
            receipt = tracing::field::Empty,
            sale_id = tracing::field::Empty,
        ),
        err
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt, EngineError> {
        let span = Span::current();
        let checkout = request.validate()?;

        if let Some(key) = checkout.idempotency_key.as_deref() {
            if let Some(existing) = self.store.find_sale_by_idempotency_key(key).await? {
                return self.replayed(existing).await;
            }
        }

        let now = Utc::now();
        let receipt_number = self.receipts.allocate(now).await?;
        span.record("receipt", receipt_number.as_str());

        let op = Checkout {
            checkout: &checkout,
            receipt_number: &receipt_number,
            config: &self.config,
            now,
        };

        let outcome = match self.run_serializable(&op).await {
            Ok(outcome) => outcome,
            Err(EngineError::Store(err)) if err.is_unique_violation_of(IDEMPOTENCY_KEY_CONSTRAINT) => {
                let key = checkout.idempotency_key.as_deref().unwrap_or_default();
                match self.store.find_sale_by_idempotency_key(key).await? {
                    Some(existing) => CheckoutOutcome::Existing(existing),
                    None => {
                        return Err(EngineError::Conflict(format!(
                            "idempotency key {key} is being used by another checkout"
                        )));
                    }
                }
            }
            Err(err) => return Err(err),
        };

        let mut receipt = match outcome {
            CheckoutOutcome::Recorded(receipt) => receipt,
            CheckoutOutcome::Existing(sale) => return self.replayed(sale).await,
        };
        span.record("sale_id", tracing::field::display(receipt.sale.id));

        let sale = &receipt.sale;
        let mut events = vec![PosEvent::SaleRecorded(SaleRecorded {
            sale_id: sale.id,
            receipt_number: sale.receipt_number.clone(),
            cashier_id: sale.cashier_id,
            total: sale.total,
            payment_kind: sale.payment_method.kind(),
            items_sold: sale.items_sold(),
            occurred_at: now,
        })];
        events.extend(receipt.low_stock_alerts.iter().map(|a| stock_low_event(a, now)));
        if let Some(payment) = &receipt.mobile_money {
            events.push(PosEvent::MobileMoneyRequested(MobileMoneyRequested {
                sale_id: payment.sale_id,
                payment_id: payment.id,
                provider: payment.provider,
                amount: payment.amount,
                reference: payment.reference.clone(),
                expires_at: payment.expires_at,
                occurred_at: now,
            }));
        }
        self.publish(&events);

        tracing::info!(
            total = %sale.total,
            payment = sale.payment_method.kind().as_str(),
            status = sale.status.as_str(),
            "sale recorded"
        );

        if let Some(payment) = receipt.mobile_money.clone() {
            self.dispatch_mobile_money(&mut receipt, &payment).await;
        }

        Ok(receipt)
    }

    async fn replayed(&self, sale: Sale) -> Result<CheckoutReceipt, EngineError> {
        tracing::info!(sale_id = %sale.id, receipt = %sale.receipt_number, "idempotent checkout replayed");
        let mobile_money = match sale.payment_method {
            PaymentMethod::MobileMoney { .. } => {
                self.store
                    .payment_by_reference(sale.receipt_number.as_str())
                    .await?
            }
            _ => None,
        };
        Ok(CheckoutReceipt {
            sale,
            low_stock_alerts: Vec::new(),
            mobile_money,
            replayed: true,
        })
    }

    /// Push the collection request to the provider. A rejection is
    /// compensated right away; an unreachable provider leaves the payment
    /// pending for the callback or the expiry sweep.
    async fn dispatch_mobile_money(&self, receipt: &mut CheckoutReceipt, payment: &MobileMoneyPayment) {
        match self.gateway.request_payment(&payment.charge()).await {
            Ok(ack) => {
                tracing::info!(
                    reference = %payment.reference,
                    provider_request_id = %ack.provider_request_id,
                    "mobile money request sent"
                );
            }
            Err(GatewayError::Rejected(reason)) => {
                tracing::warn!(reference = %payment.reference, %reason, "mobile money request rejected");
                match self
                    .settle_mobile_money(&payment.reference, PaymentOutcome::Failed { reason })
                    .await
                {
                    Ok(settlement) => {
                        receipt.sale = settlement.sale;
                        receipt.mobile_money = Some(settlement.payment);
                    }
                    Err(err) => {
                        tracing::error!(reference = %payment.reference, error = %err, "failed to compensate rejected payment");
                    }
                }
            }
            Err(err @ GatewayError::Unavailable(_)) => {
                tracing::warn!(reference = %payment.reference, error = %err, "mobile money provider unavailable; payment left pending");
            }
        }
    }
}
