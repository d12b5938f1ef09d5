use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rust_decimal_macros::dec;

use order_relay::domain::models::types::{EcSignature, OrderHash, SignedOrder, ZERO_ADDRESS};

fn create_test_order(salt: &str) -> SignedOrder {
    SignedOrder {
        exchange_contract_address: "0x12459c951127e0c374ff9105dda097662a027093".to_string(),
        maker: "0x9e56625509c2f60af937f23b7b532600390e8c8b".to_string(),
        taker: ZERO_ADDRESS.to_string(),
        maker_token_address: "0xa2b31dacf30a9c50ca473337c01d8a201ae33e32".to_string(),
        taker_token_address: "0x323b5d4c32345ced77393b3530b1eed0f346429d".to_string(),
        fee_recipient: ZERO_ADDRESS.to_string(),
        maker_token_amount: dec!(10000000000000000),
        taker_token_amount: dec!(20000000000000000),
        maker_fee: dec!(0),
        taker_fee: dec!(0),
        expiration_unix_timestamp_sec: dec!(2524636800),
        salt: salt.to_string(),
        ec_signature: EcSignature {
            v: 27,
            r: "0x61a3ed31b43c8780e905a260a35faefcc527be7516aa11c0256729b5b351bc33".to_string(),
            s: "0x40349190569279751135161d22529dc25add4f6069af05be04cacbda2ace2254".to_string(),
        },
    }
}

fn bench_hash_compute(c: &mut Criterion) {
    let order = create_test_order("1");
    let mut group = c.benchmark_group("order_hash");

    group.bench_function("keccak_single", |b| {
        b.iter(|| black_box(OrderHash::compute(black_box(&order))))
    });

    group.finish();
}

fn bench_hash_batch(c: &mut Criterion) {
    let orders: Vec<SignedOrder> = (0..100).map(|i| create_test_order(&i.to_string())).collect();
    let mut group = c.benchmark_group("order_hash_batch");

    group.bench_function("keccak_100_distinct", |b| {
        b.iter(|| {
            for order in &orders {
                black_box(OrderHash::compute(order));
            }
        })
    });

    group.finish();
}

fn bench_hash_hex_roundtrip(c: &mut Criterion) {
    let hash = create_test_order("1").order_hash();
    let rendered = hash.to_string();
    let mut group = c.benchmark_group("order_hash_hex");

    group.bench_function("display", |b| b.iter(|| black_box(hash.to_string())));
    group.bench_function("parse", |b| {
        b.iter(|| black_box(rendered.parse::<OrderHash>().unwrap()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_hash_compute,
    bench_hash_batch,
    bench_hash_hex_roundtrip,
);
criterion_main!(benches);
