use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use vevurn_core::{Money, ProductId, UserId};
use vevurn_events::{EventEnvelope, InMemoryEventBus};
use vevurn_infra::{
    EngineConfig, InMemoryPosStore, InMemorySequence, ReceiptNumberAllocator, RecordingGateway, SaleEngine,
};
use vevurn_inventory::{MovementType, ProductStock};
use vevurn_sales::{BusinessClock, CartLine, CheckoutRequest, PaymentMethod};

type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn engine() -> SaleEngine<Bus> {
    let receipts = ReceiptNumberAllocator::new(Arc::new(InMemorySequence::new()), BusinessClock::utc());
    SaleEngine::new(
        Arc::new(InMemoryPosStore::new()),
        receipts,
        Arc::new(RecordingGateway::new()),
        Arc::new(InMemoryEventBus::new()),
        EngineConfig {
            retry_backoff: Duration::from_millis(1),
            ..EngineConfig::default()
        },
    )
}

/// Seed `count` products with effectively unlimited stock.
fn seed(rt: &Runtime, engine: &SaleEngine<Bus>, count: usize) -> Vec<ProductId> {
    rt.block_on(async {
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let product = engine
                .upsert_product(ProductStock {
                    id: ProductId::new(),
                    sku: format!("BENCH-{i:04}"),
                    name: format!("Bench item {i}"),
                    unit_price: Money::new(1_500),
                    stock_quantity: 1_000_000_000,
                    min_stock_level: 0,
                    active: true,
                    version: 0,
                    updated_at: Utc::now(),
                })
                .await
                .unwrap();
            ids.push(product.id);
        }
        ids
    })
}

fn cash_request(products: &[ProductId]) -> CheckoutRequest {
    CheckoutRequest {
        lines: products
            .iter()
            .map(|&product_id| CartLine { product_id, quantity: 1 })
            .collect(),
        payment: PaymentMethod::Cash {
            tendered: Money::new(1_000_000_000),
        },
        discount: Money::ZERO,
        customer_id: None,
        cashier_id: UserId::new(),
        idempotency_key: None,
        notes: None,
    }
}

fn bench_checkout_latency(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("checkout_latency");

    for lines in [1usize, 5, 25].iter() {
        let engine = engine();
        let products = seed(&rt, &engine, *lines);
        group.throughput(Throughput::Elements(*lines as u64));
        group.bench_with_input(BenchmarkId::new("cash_sale_lines", lines), lines, |b, _| {
            b.iter(|| {
                let receipt = rt.block_on(engine.checkout(cash_request(&products))).unwrap();
                black_box(receipt);
            });
        });
    }

    group.finish();
}

fn bench_contended_checkout(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("contended_checkout");
    group.sample_size(20);

    for tills in [4usize, 16].iter() {
        let engine = Arc::new(engine());
        let products = Arc::new(seed(&rt, &engine, 1));
        group.throughput(Throughput::Elements(*tills as u64));
        group.bench_with_input(BenchmarkId::new("same_product", tills), tills, |b, &tills| {
            b.iter(|| {
                rt.block_on(async {
                    let mut handles = Vec::with_capacity(tills);
                    for _ in 0..tills {
                        let engine = engine.clone();
                        let products = products.clone();
                        handles.push(tokio::spawn(async move {
                            engine.checkout(cash_request(&products)).await
                        }));
                    }
                    for handle in handles {
                        black_box(handle.await.unwrap().unwrap());
                    }
                });
            });
        });
    }

    group.finish();
}

fn bench_void_round_trip(c: &mut Criterion) {
    let rt = runtime();
    let engine = engine();
    let products = seed(&rt, &engine, 3);
    let manager = UserId::new();

    let mut group = c.benchmark_group("void_round_trip");
    group.bench_function("checkout_then_void", |b| {
        b.iter(|| {
            rt.block_on(async {
                let receipt = engine.checkout(cash_request(&products)).await.unwrap();
                let voided = engine.void_sale(receipt.sale.id, "bench", manager).await.unwrap();
                black_box(voided);
            });
        });
    });
    group.bench_function("restock", |b| {
        b.iter(|| {
            let adjusted = rt
                .block_on(engine.adjust_stock(products[0], 1, MovementType::Restock, None, manager))
                .unwrap();
            black_box(adjusted);
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_checkout_latency,
    bench_contended_checkout,
    bench_void_round_trip
);
criterion_main!(benches);
