//! Integration tests for the sale transaction engine.
//!
//! Tests: Request → SaleEngine → PosStore transaction → EventBus
//!
//! Verifies:
//! - A checkout writes sale, items, stock, movements, alerts, payment and
//!   metrics together, or nothing at all
//! - Concurrent checkouts never oversell
//! - Serialization failures are retried
//! - Idempotency keys replay the original sale
//! - Voids and failed mobile-money payments undo stock and metrics

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use vevurn_core::{CustomerId, Money, ProductId, UserId};
    use vevurn_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use vevurn_inventory::{AlertSeverity, MovementType, ProductStock};
    use vevurn_sales::{
        BusinessClock, BusinessMetrics, CartLine, CheckoutRequest, MobileMoneyProvider,
        MobileMoneyStatus, PaymentMethod, PaymentOutcome, PaymentStatus, SaleStatus,
    };

    use crate::engine::{EngineConfig, EngineError, SaleEngine};
    use crate::mobile_money::{GatewayError, RecordingGateway};
    use crate::sequence::{InMemorySequence, ReceiptNumberAllocator};
    use crate::store::{InMemoryPosStore, Pagination, SaleFilter};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;

    struct Harness {
        engine: Arc<SaleEngine<Bus>>,
        store: InMemoryPosStore,
        gateway: Arc<RecordingGateway>,
        bus: Bus,
    }

    fn harness() -> Harness {
        let store = InMemoryPosStore::new();
        let gateway = Arc::new(RecordingGateway::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let receipts = ReceiptNumberAllocator::new(Arc::new(InMemorySequence::new()), BusinessClock::utc());
        let config = EngineConfig {
            retry_backoff: Duration::from_millis(1),
            ..EngineConfig::default()
        };
        let engine = SaleEngine::new(
            Arc::new(store.clone()),
            receipts,
            gateway.clone(),
            bus.clone(),
            config,
        );
        Harness {
            engine: Arc::new(engine),
            store,
            gateway,
            bus,
        }
    }

    impl Harness {
        async fn seed(&self, sku: &str, price: i64, stock: i64, min: i64) -> ProductStock {
            self.engine
                .upsert_product(ProductStock {
                    id: ProductId::new(),
                    sku: sku.to_string(),
                    name: format!("{sku} item"),
                    unit_price: Money::new(price),
                    stock_quantity: stock,
                    min_stock_level: min,
                    active: true,
                    version: 0,
                    updated_at: Utc::now(),
                })
                .await
                .unwrap()
        }

        async fn stock_of(&self, id: ProductId) -> i64 {
            self.engine.product(id).await.unwrap().stock_quantity
        }
    }

    fn cash(lines: Vec<(ProductId, i64)>, tendered: i64) -> CheckoutRequest {
        request(lines, PaymentMethod::Cash {
            tendered: Money::new(tendered),
        })
    }

    fn mtn(lines: Vec<(ProductId, i64)>) -> CheckoutRequest {
        request(lines, PaymentMethod::MobileMoney {
            provider: MobileMoneyProvider::Mtn,
            phone: "0788 123 456".to_string(),
        })
    }

    fn request(lines: Vec<(ProductId, i64)>, payment: PaymentMethod) -> CheckoutRequest {
        CheckoutRequest {
            lines: lines
                .into_iter()
                .map(|(product_id, quantity)| CartLine { product_id, quantity })
                .collect(),
            payment,
            discount: Money::ZERO,
            customer_id: None,
            cashier_id: UserId::new(),
            idempotency_key: None,
            notes: None,
        }
    }

    /// Sum of the metric deltas of every sale still in force.
    async fn expected_metrics(h: &Harness) -> BusinessMetrics {
        let sales = h
            .engine
            .sales(&SaleFilter::default(), Pagination::new(Some(500), None))
            .await
            .unwrap();
        let mut total = BusinessMetrics::default();
        for sale in sales.iter().filter(|s| s.is_effective()) {
            total.apply(&sale.metrics_delta()).unwrap();
        }
        total
    }

    #[tokio::test]
    async fn cash_checkout_writes_sale_stock_movement_and_metrics() {
        let h = harness();
        let phone_case = h.seed("CASE-01", 10_000, 10, 2).await;

        let receipt = h.engine.checkout(cash(vec![(phone_case.id, 3)], 50_000)).await.unwrap();
        let sale = &receipt.sale;

        assert!(!receipt.replayed);
        assert!(sale.receipt_number.as_str().starts_with("RCP-"));
        assert!(sale.receipt_number.as_str().ends_with("-000001"));
        assert!(sale.verify_hash());
        assert_eq!(sale.status, SaleStatus::Completed);
        assert_eq!(sale.payment_status, PaymentStatus::Paid);
        assert_eq!(sale.subtotal, Money::new(30_000));
        assert_eq!(sale.tax, Money::new(5_400));
        assert_eq!(sale.total, Money::new(35_400));
        assert_eq!(sale.change_due, Some(Money::new(14_600)));
        assert_eq!(sale.items.len(), 1);
        assert_eq!(sale.items[0].unit_price, Money::new(10_000));

        assert_eq!(h.stock_of(phone_case.id).await, 7);

        let movements = h.engine.movements(phone_case.id, Pagination::default()).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, MovementType::Sale);
        assert_eq!(movements[0].quantity_change, -3);
        assert_eq!((movements[0].stock_before, movements[0].stock_after), (10, 7));
        assert_eq!(movements[0].reference.as_deref(), Some(sale.receipt_number.as_str()));

        let daily = h.engine.daily_metrics(sale.business_date).await.unwrap();
        assert_eq!(daily.metrics.sales_count, 1);
        assert_eq!(daily.metrics.items_sold, 3);
        assert_eq!(daily.metrics.gross_revenue, Money::new(35_400));
        assert_eq!(daily.metrics.cash_total, Money::new(35_400));
        assert_eq!(daily.metrics.tax_total, Money::new(5_400));

        let hourly = h.engine.hourly_metrics(sale.business_date).await.unwrap();
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].hour, sale.business_hour);
        assert_eq!(hourly[0].metrics, daily.metrics);
    }

    #[tokio::test]
    async fn failed_checkout_leaves_no_trace() {
        let h = harness();
        let a = h.seed("SIM-01", 1_000, 5, 0).await;
        let b = h.seed("CHG-01", 8_000, 2, 0).await;

        let err = h
            .engine
            .checkout(cash(vec![(a.id, 1), (b.id, 3)], 100_000))
            .await
            .unwrap_err();
        match err {
            EngineError::InsufficientStock {
                product_id,
                requested,
                available,
                ..
            } => {
                assert_eq!(product_id, b.id);
                assert_eq!((requested, available), (3, 2));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(h.stock_of(a.id).await, 5);
        assert_eq!(h.stock_of(b.id).await, 2);
        assert_eq!(h.store.sale_count().await, 0);
        assert!(h.store.all_movements().await.is_empty());
        let today = BusinessClock::utc().date(Utc::now());
        assert!(h.engine.daily_metrics(today).await.unwrap().metrics.is_empty());
    }

    #[tokio::test]
    async fn unknown_and_inactive_products_are_rejected() {
        let h = harness();
        let err = h.engine.checkout(cash(vec![(ProductId::new(), 1)], 1_000)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        let mut retired = h.seed("OLD-01", 1_000, 5, 0).await;
        retired.active = false;
        h.engine.upsert_product(retired.clone()).await.unwrap();
        let err = h.engine.checkout(cash(vec![(retired.id, 1)], 10_000)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn short_cash_tender_is_rejected_and_burns_its_receipt_number() {
        let h = harness();
        let p = h.seed("CASE-02", 10_000, 5, 0).await;

        let err = h.engine.checkout(cash(vec![(p.id, 1)], 5_000)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(h.stock_of(p.id).await, 5);

        let receipt = h.engine.checkout(cash(vec![(p.id, 1)], 20_000)).await.unwrap();
        assert!(receipt.sale.receipt_number.as_str().ends_with("-000002"));
    }

    #[tokio::test]
    async fn low_stock_alert_is_raised_once_and_then_refreshed() {
        let h = harness();
        let events = h.bus.subscribe();
        let p = h.seed("EAR-01", 2_000, 5, 3).await;

        let first = h.engine.checkout(cash(vec![(p.id, 2)], 100_000)).await.unwrap();
        assert_eq!(first.low_stock_alerts.len(), 1);
        assert_eq!(first.low_stock_alerts[0].severity, AlertSeverity::Low);

        // Same severity: refreshed quietly.
        let second = h.engine.checkout(cash(vec![(p.id, 1)], 100_000)).await.unwrap();
        assert!(second.low_stock_alerts.is_empty());

        let third = h.engine.checkout(cash(vec![(p.id, 2)], 100_000)).await.unwrap();
        assert_eq!(third.low_stock_alerts[0].severity, AlertSeverity::OutOfStock);

        let open = h.engine.open_alerts().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].stock_quantity, 0);
        assert_eq!(open[0].id, first.low_stock_alerts[0].id);

        let mut stock_low = 0;
        while let Ok(envelope) = events.try_recv() {
            if envelope.event_type() == "inventory.stock_low" {
                stock_low += 1;
            }
        }
        assert_eq!(stock_low, 2);
    }

    #[tokio::test]
    async fn repeated_idempotency_key_replays_the_original_sale() {
        let h = harness();
        let p = h.seed("CASE-03", 1_000, 10, 0).await;

        let mut req = cash(vec![(p.id, 2)], 10_000);
        req.idempotency_key = Some("till-1-000042".to_string());

        let first = h.engine.checkout(req.clone()).await.unwrap();
        let second = h.engine.checkout(req).await.unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.sale.id, second.sale.id);
        assert_eq!(h.stock_of(p.id).await, 8);
        assert_eq!(h.store.sale_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_with_one_key_record_one_sale() {
        let h = harness();
        let p = h.seed("CASE-04", 1_000, 50, 0).await;

        let mut req = cash(vec![(p.id, 1)], 10_000);
        req.idempotency_key = Some("till-2-000007".to_string());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = h.engine.clone();
            let req = req.clone();
            handles.push(tokio::spawn(async move { engine.checkout(req).await }));
        }

        let mut receipts = Vec::new();
        for handle in handles {
            receipts.push(handle.await.unwrap().unwrap());
        }

        let sale_id = receipts[0].sale.id;
        assert!(receipts.iter().all(|r| r.sale.id == sale_id));
        assert_eq!(receipts.iter().filter(|r| !r.replayed).count(), 1);
        assert_eq!(h.stock_of(p.id).await, 49);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checkouts_never_oversell() {
        let h = harness();
        let p = h.seed("LAST-10", 5_000, 10, 0).await;

        let mut handles = Vec::new();
        for _ in 0..25 {
            let engine = h.engine.clone();
            let req = cash(vec![(p.id, 1)], 10_000);
            handles.push(tokio::spawn(async move { engine.checkout(req).await }));
        }

        let mut sold = Vec::new();
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => sold.push(receipt.sale.receipt_number),
                Err(EngineError::InsufficientStock { available, .. }) => {
                    assert_eq!(available, 0);
                    refused += 1;
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(sold.len(), 10);
        assert_eq!(refused, 15);
        sold.sort();
        sold.dedup();
        assert_eq!(sold.len(), 10, "receipt numbers must be unique");

        assert_eq!(h.stock_of(p.id).await, 0);
        assert_eq!(h.store.all_movements().await.len(), 10);
        let today = BusinessClock::utc().date(Utc::now());
        assert_eq!(h.engine.daily_metrics(today).await.unwrap().metrics.sales_count, 10);
    }

    #[tokio::test]
    async fn serialization_failures_are_retried() {
        let h = harness();
        let p = h.seed("CASE-05", 1_000, 5, 0).await;

        h.store.fail_next_commits(2);
        let receipt = h.engine.checkout(cash(vec![(p.id, 1)], 10_000)).await.unwrap();

        assert_eq!(receipt.sale.status, SaleStatus::Completed);
        assert_eq!(h.store.sale_count().await, 1);
        assert_eq!(h.stock_of(p.id).await, 4);
        // One receipt number per request, however many attempts it took.
        assert!(receipt.sale.receipt_number.as_str().ends_with("-000001"));
    }

    #[tokio::test]
    async fn persistent_serialization_failures_exhaust_retries() {
        let h = harness();
        let p = h.seed("CASE-06", 1_000, 5, 0).await;

        h.store.fail_next_commits(3);
        let err = h.engine.checkout(cash(vec![(p.id, 1)], 10_000)).await.unwrap_err();

        assert!(matches!(err, EngineError::RetriesExhausted { attempts: 3 }));
        assert_eq!(h.store.sale_count().await, 0);
        assert_eq!(h.stock_of(p.id).await, 5);
    }

    #[tokio::test]
    async fn mobile_money_sale_waits_for_the_provider() {
        let h = harness();
        let p = h.seed("PHONE-01", 100_000, 3, 0).await;

        let receipt = h.engine.checkout(mtn(vec![(p.id, 1)])).await.unwrap();
        let payment = receipt.mobile_money.clone().unwrap();

        assert_eq!(receipt.sale.status, SaleStatus::PendingPayment);
        assert_eq!(receipt.sale.payment_status, PaymentStatus::Pending);
        assert_eq!(payment.status, MobileMoneyStatus::Pending);
        assert_eq!(payment.phone, "250788123456");
        assert_eq!(payment.reference, receipt.sale.receipt_number.as_str());
        assert_eq!(payment.amount, receipt.sale.total);
        assert_eq!(h.gateway.requests().len(), 1);
        assert_eq!(h.stock_of(p.id).await, 2);

        let settled = h
            .engine
            .settle_mobile_money(
                &payment.reference,
                PaymentOutcome::Successful {
                    provider_transaction_id: "MTN-778899".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(settled.changed);
        assert_eq!(settled.sale.status, SaleStatus::Completed);
        assert_eq!(settled.sale.payment_status, PaymentStatus::Paid);
        assert_eq!(settled.payment.provider_transaction_id.as_deref(), Some("MTN-778899"));

        // A late failure callback does not undo a settled payment.
        let late = h
            .engine
            .settle_mobile_money(
                &payment.reference,
                PaymentOutcome::Failed {
                    reason: "timeout".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(!late.changed);
        assert_eq!(late.sale.status, SaleStatus::Completed);
        assert_eq!(h.stock_of(p.id).await, 2);

        let daily = h.engine.daily_metrics(receipt.sale.business_date).await.unwrap();
        assert_eq!(daily.metrics.mobile_money_total, receipt.sale.total);
    }

    #[tokio::test]
    async fn failed_mobile_money_payment_restores_stock_and_metrics() {
        let h = harness();
        let p = h.seed("PHONE-02", 100_000, 3, 2).await;

        let receipt = h.engine.checkout(mtn(vec![(p.id, 2)])).await.unwrap();
        assert_eq!(receipt.low_stock_alerts.len(), 1);

        let settled = h
            .engine
            .settle_mobile_money(
                &receipt.sale.receipt_number.to_string(),
                PaymentOutcome::Failed {
                    reason: "insufficient balance".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(settled.sale.status, SaleStatus::Cancelled);
        assert_eq!(settled.sale.payment_status, PaymentStatus::Failed);
        assert_eq!(settled.payment.status, MobileMoneyStatus::Failed);
        assert_eq!(h.stock_of(p.id).await, 3);
        assert!(h.engine.open_alerts().await.unwrap().is_empty());

        let movements = h.engine.movements(p.id, Pagination::default()).await.unwrap();
        assert_eq!(movements[0].movement_type, MovementType::SaleReversal);
        assert_eq!(movements[0].quantity_change, 2);

        let daily = h.engine.daily_metrics(receipt.sale.business_date).await.unwrap();
        assert!(daily.metrics.is_empty());
    }

    #[tokio::test]
    async fn rejected_request_is_compensated_immediately() {
        let h = harness();
        let p = h.seed("PHONE-03", 50_000, 4, 0).await;
        h.gateway
            .respond_with(Some(GatewayError::Rejected("subscriber not registered".to_string())));

        let receipt = h.engine.checkout(mtn(vec![(p.id, 1)])).await.unwrap();

        assert_eq!(receipt.sale.status, SaleStatus::Cancelled);
        assert_eq!(
            receipt.mobile_money.as_ref().map(|m| m.status),
            Some(MobileMoneyStatus::Failed)
        );
        assert_eq!(h.stock_of(p.id).await, 4);
    }

    #[tokio::test]
    async fn unreachable_provider_leaves_payment_for_the_expiry_sweep() {
        let h = harness();
        let p = h.seed("PHONE-04", 50_000, 4, 0).await;
        h.gateway
            .respond_with(Some(GatewayError::Unavailable("connection refused".to_string())));

        let receipt = h.engine.checkout(mtn(vec![(p.id, 1)])).await.unwrap();
        assert_eq!(receipt.sale.status, SaleStatus::PendingPayment);

        assert!(h.engine.expire_pending_payments(Utc::now()).await.unwrap().is_empty());

        let later = Utc::now() + chrono::Duration::minutes(10);
        let expired = h.engine.expire_pending_payments(later).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].payment.status, MobileMoneyStatus::Expired);
        assert_eq!(expired[0].sale.status, SaleStatus::Cancelled);
        assert_eq!(h.stock_of(p.id).await, 4);

        assert!(h.engine.expire_pending_payments(later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn void_restores_stock_and_reverses_metrics() {
        let h = harness();
        let events = h.bus.subscribe();
        let p = h.seed("CASE-07", 4_000, 6, 0).await;
        let manager = UserId::new();

        let receipt = h.engine.checkout(cash(vec![(p.id, 4)], 100_000)).await.unwrap();
        let voided = h
            .engine
            .void_sale(receipt.sale.id, "customer changed mind", manager)
            .await
            .unwrap();

        assert_eq!(voided.status, SaleStatus::Voided);
        assert_eq!(voided.payment_status, PaymentStatus::Refunded);
        assert_eq!(voided.voided_by, Some(manager));
        assert_eq!(h.stock_of(p.id).await, 6);
        assert!(
            h.engine
                .daily_metrics(receipt.sale.business_date)
                .await
                .unwrap()
                .metrics
                .is_empty()
        );

        let err = h.engine.void_sale(receipt.sale.id, "again", manager).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        let types: Vec<String> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.event_type().to_string())
            .collect();
        assert_eq!(types, vec!["sale.recorded", "sale.voided"]);
    }

    #[tokio::test]
    async fn only_completed_sales_can_be_voided() {
        let h = harness();
        let p = h.seed("PHONE-05", 50_000, 4, 0).await;
        let receipt = h.engine.checkout(mtn(vec![(p.id, 1)])).await.unwrap();

        let err = h
            .engine
            .void_sale(receipt.sale.id, "mistake", UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        let err = h
            .engine
            .void_sale(vevurn_core::SaleId::new(), "mistake", UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn voided_credit_sale_is_closed_as_refunded() {
        let h = harness();
        let p = h.seed("TV-01", 300_000, 2, 0).await;

        let mut req = request(vec![(p.id, 1)], PaymentMethod::Credit);
        req.customer_id = Some(CustomerId::new());
        let receipt = h.engine.checkout(req).await.unwrap();
        assert_eq!(receipt.sale.payment_status, PaymentStatus::Outstanding);

        let voided = h
            .engine
            .void_sale(receipt.sale.id, "loan declined", UserId::new())
            .await
            .unwrap();
        assert_eq!(voided.payment_status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn restock_resolves_the_open_alert() {
        let h = harness();
        let p = h.seed("CASE-08", 1_000, 3, 5).await;
        let clerk = UserId::new();

        h.engine.checkout(cash(vec![(p.id, 1)], 10_000)).await.unwrap();
        assert_eq!(h.engine.open_alerts().await.unwrap().len(), 1);

        let restock = h
            .engine
            .adjust_stock(p.id, 20, MovementType::Restock, Some("supplier delivery"), clerk)
            .await
            .unwrap();
        assert_eq!(restock.product.stock_quantity, 22);
        assert_eq!(restock.movement.movement_type, MovementType::Restock);
        assert!(restock.alert.is_none());
        assert!(h.engine.open_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn manual_adjustments_are_checked() {
        let h = harness();
        let p = h.seed("CASE-09", 1_000, 3, 0).await;
        let clerk = UserId::new();

        let err = h
            .engine
            .adjust_stock(p.id, -1, MovementType::Adjustment, None, clerk)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = h
            .engine
            .adjust_stock(p.id, -4, MovementType::Adjustment, Some("stock count"), clerk)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        let err = h
            .engine
            .adjust_stock(p.id, -1, MovementType::Sale, Some("manual sale"), clerk)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let adjusted = h
            .engine
            .adjust_stock(p.id, -3, MovementType::Adjustment, Some("damaged in storage"), clerk)
            .await
            .unwrap();
        assert_eq!(adjusted.product.stock_quantity, 0);
        assert_eq!(adjusted.alert.map(|a| a.severity), Some(AlertSeverity::OutOfStock));
    }

    fn catalog_entry(sku: &str, min: i64) -> ProductStock {
        ProductStock {
            id: ProductId::new(),
            sku: sku.to_string(),
            name: format!("{sku} item"),
            unit_price: Money::new(4_000),
            stock_quantity: 0,
            min_stock_level: min,
            active: true,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn new_product_books_opening_stock_as_a_restock() {
        let h = harness();
        let clerk = UserId::new();

        let created = h
            .engine
            .create_product(catalog_entry("CHG-01", 5), 4, clerk)
            .await
            .unwrap();
        assert_eq!(created.product.stock_quantity, 4);
        let movement = created.opening_movement.unwrap();
        assert_eq!(movement.movement_type, MovementType::Restock);
        assert_eq!((movement.stock_before, movement.stock_after), (0, 4));
        assert_eq!(movement.reason.as_deref(), Some("opening stock"));
        assert_eq!(movement.created_by, Some(clerk));
        assert_eq!(created.alert.map(|a| a.severity), Some(AlertSeverity::Low));
        assert_eq!(h.stock_of(created.product.id).await, 4);

        let empty = h
            .engine
            .create_product(catalog_entry("CHG-02", 0), 0, clerk)
            .await
            .unwrap();
        assert!(empty.opening_movement.is_none());
        assert!(h
            .engine
            .movements(empty.product.id, Pagination::default())
            .await
            .unwrap()
            .is_empty());

        let err = h
            .engine
            .create_product(catalog_entry("CHG-01", 0), 1, clerk)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(msg) if msg.contains("CHG-01")));

        let err = h
            .engine
            .create_product(catalog_entry("CHG-03", 0), -1, clerk)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_sku_on_upsert_is_a_conflict() {
        let h = harness();
        h.seed("DUP-1", 1_000, 1, 0).await;

        let err = h
            .engine
            .upsert_product(catalog_entry("DUP-1", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn failed_product_creation_leaves_nothing_behind() {
        let h = harness();
        let entry = catalog_entry("CHG-04", 0);
        h.store.fail_next_commits(3);

        let err = h
            .engine
            .create_product(entry.clone(), 10, UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RetriesExhausted { attempts: 3 }));
        assert!(matches!(
            h.engine.product(entry.id).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(h.store.all_movements().await.is_empty());

        // The sku is still free.
        let created = h
            .engine
            .create_product(catalog_entry("CHG-04", 0), 10, UserId::new())
            .await
            .unwrap();
        assert_eq!(created.product.stock_quantity, 10);
    }

    #[tokio::test]
    async fn huge_restock_is_classified_as_healthy() {
        let h = harness();
        let p = h.seed("BULK-1", 10, 3, 10).await;
        let clerk = UserId::new();

        h.engine
            .adjust_stock(p.id, -1, MovementType::Adjustment, Some("count"), clerk)
            .await
            .unwrap();
        assert_eq!(h.engine.open_alerts().await.unwrap().len(), 1);

        let restock = h
            .engine
            .adjust_stock(p.id, i64::MAX / 2, MovementType::Restock, None, clerk)
            .await
            .unwrap();
        assert_eq!(restock.product.stock_quantity, i64::MAX / 2 + 2);
        assert!(restock.alert.is_none());
        assert!(h.engine.open_alerts().await.unwrap().is_empty());

        let err = h
            .engine
            .adjust_stock(p.id, i64::MAX, MovementType::Restock, None, clerk)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg == "stock overflow"));
        assert_eq!(h.stock_of(p.id).await, i64::MAX / 2 + 2);
    }

    #[tokio::test]
    async fn metrics_always_equal_the_sum_of_sales_in_force() {
        let h = harness();
        let a = h.seed("MIX-A", 2_500, 50, 0).await;
        let b = h.seed("MIX-B", 12_000, 50, 0).await;

        let kept = h.engine.checkout(cash(vec![(a.id, 2), (b.id, 1)], 100_000)).await.unwrap();
        let voided = h.engine.checkout(cash(vec![(a.id, 5)], 100_000)).await.unwrap();
        let failed = h.engine.checkout(mtn(vec![(b.id, 2)])).await.unwrap();
        let paid = h.engine.checkout(mtn(vec![(a.id, 1)])).await.unwrap();
        let mut discounted = cash(vec![(b.id, 1)], 100_000);
        discounted.discount = Money::new(2_000);
        h.engine.checkout(discounted).await.unwrap();

        h.engine
            .void_sale(voided.sale.id, "duplicate ring-up", UserId::new())
            .await
            .unwrap();
        h.engine
            .settle_mobile_money(
                failed.sale.receipt_number.as_str(),
                PaymentOutcome::Failed {
                    reason: "cancelled by customer".to_string(),
                },
            )
            .await
            .unwrap();
        h.engine
            .settle_mobile_money(
                paid.sale.receipt_number.as_str(),
                PaymentOutcome::Successful {
                    provider_transaction_id: "MTN-1".to_string(),
                },
            )
            .await
            .unwrap();

        let daily = h.engine.daily_metrics(kept.sale.business_date).await.unwrap();
        assert_eq!(daily.metrics, expected_metrics(&h).await);
        assert_eq!(daily.metrics.sales_count, 3);
        assert_eq!(h.stock_of(a.id).await, 47);
        assert_eq!(h.stock_of(b.id).await, 48);
    }
}
