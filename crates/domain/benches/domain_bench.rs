use common::OrderId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{AttemptStatus, LineItem, MerchantTransactionId, Money, NewOrder, OrderStatus};

fn sample_order(items: usize) -> NewOrder {
    let mut builder = NewOrder::builder("uid-bench", "Bench Customer");
    for i in 0..items {
        builder = builder.item(
            LineItem::new(format!("SKU-{i:03}"), format!("Drink {i}"), 2, Money::from_minor(15000))
                .with_size("Medium")
                .with_customization("Oat milk"),
        );
    }
    builder.build()
}

fn bench_validate(c: &mut Criterion) {
    let order = sample_order(10);

    c.bench_function("domain/validate_new_order_10_items", |b| {
        b.iter(|| order.validate().unwrap());
    });
}

fn bench_into_order(c: &mut Criterion) {
    c.bench_function("domain/into_order", |b| {
        b.iter(|| {
            sample_order(3)
                .into_order(OrderId::new(), MerchantTransactionId::new("TXNBENCH"))
                .unwrap()
        });
    });
}

fn bench_status_parsing(c: &mut Criterion) {
    c.bench_function("domain/parse_statuses", |b| {
        b.iter(|| {
            AttemptStatus::from_gateway("completed").unwrap();
            OrderStatus::parse("Preparing").unwrap();
        });
    });
}

criterion_group!(benches, bench_validate, bench_into_order, bench_status_parsing);
criterion_main!(benches);
