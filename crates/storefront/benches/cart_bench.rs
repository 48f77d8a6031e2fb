use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use storefront::{CartLedger, LineKey, MemoryLocalStore, Money, Product, ProductId};

fn product(index: usize) -> Product {
    Product {
        name: format!("Product {index}"),
        price: Money::from_cents(1990 + index as i64),
        stock: 100,
        images: vec![format!("product-{index}.jpg")],
        sizes: vec!["P".into(), "M".into(), "G".into()],
        colors: vec!["Preto".into()],
        category: "bench".into(),
        description: String::new(),
    }
}

fn filled_cart(lines: usize) -> CartLedger<MemoryLocalStore> {
    let mut cart = CartLedger::load(MemoryLocalStore::new()).unwrap();
    for i in 0..lines {
        cart.add_item(ProductId::new(format!("p{i}")), &product(i), "M", "Preto", 1)
            .unwrap();
    }
    cart
}

fn bench_add_item(c: &mut Criterion) {
    let item = product(0);

    c.bench_function("cart/add_item_merge", |b| {
        b.iter_batched(
            || filled_cart(20),
            |mut cart| {
                cart.add_item(ProductId::new("p0"), &item, "M", "Preto", 1)
                    .unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_set_quantity(c: &mut Criterion) {
    let key = LineKey::new(ProductId::new("p10"), "M", "Preto");

    c.bench_function("cart/set_quantity", |b| {
        b.iter_batched(
            || filled_cart(20),
            |mut cart| {
                cart.set_quantity(&key, 2).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_total(c: &mut Criterion) {
    let cart = filled_cart(100);

    c.bench_function("cart/total_100_lines", |b| {
        b.iter(|| cart.total());
    });
}

fn bench_reload(c: &mut Criterion) {
    let store = MemoryLocalStore::new();
    {
        let mut cart = CartLedger::load(store.clone()).unwrap();
        for i in 0..50 {
            cart.add_item(ProductId::new(format!("p{i}")), &product(i), "G", "Preto", 2)
                .unwrap();
        }
    }

    c.bench_function("cart/load_50_lines", |b| {
        b.iter(|| CartLedger::load(store.clone()).unwrap());
    });
}

criterion_group!(
    benches,
    bench_add_item,
    bench_set_quantity,
    bench_total,
    bench_reload
);
criterion_main!(benches);
