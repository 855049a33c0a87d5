use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chain_wallet_watcher::format::{format_units, min_value_units, parse_hex_u128, parse_units};
use chain_wallet_watcher::models::ChainKind;

fn bench_format_units(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_units");

    for chain in [ChainKind::Ethereum, ChainKind::Solana, ChainKind::Bitcoin] {
        let decimals = chain.native_decimals();
        let display = chain.display_decimals();
        for value in [1u128, 1_234_567_890, 10u128.pow(decimals) * 42 + 7, u128::MAX] {
            group.bench_with_input(
                BenchmarkId::new(chain.as_str(), value),
                &value,
                |b, &value| b.iter(|| format_units(black_box(value), decimals, display)),
            );
        }
    }

    group.finish();
}

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");

    group.bench_function("parse_hex_u128", |b| {
        b.iter(|| parse_hex_u128(black_box("0x1bc16d674ec80000")))
    });
    group.bench_function("parse_units", |b| {
        b.iter(|| parse_units(black_box("1234.567890123456789"), 18))
    });
    group.bench_function("min_value_units", |b| {
        b.iter(|| min_value_units(black_box(0.001), 8))
    });

    group.finish();
}

criterion_group!(benches, bench_format_units, bench_parsing);
criterion_main!(benches);
