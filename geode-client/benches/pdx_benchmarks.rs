//! PDX encode/decode throughput benchmarks.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geode_client::PdxSerializable;
use geode_core::{PdxInstance, PdxSerializer, PdxType, PdxTypeRegistry};

#[derive(Debug, Clone, PdxSerializable)]
#[pdx(class_name = "bench.Trade")]
struct Trade {
    #[pdx(identity)]
    id: i64,
    symbol: String,
    price: f64,
    qty: i32,
    tags: Vec<String>,
    payload: Vec<u8>,
}

#[derive(Debug, Clone, PdxSerializable)]
#[pdx(class_name = "bench.Trade")]
struct TradeSummary {
    id: i64,
    price: f64,
}

fn trade(payload_len: usize) -> Trade {
    Trade {
        id: 42,
        symbol: "GEOD".to_string(),
        price: 101.25,
        qty: 300,
        tags: vec!["fx".to_string(), "spot".to_string()],
        payload: vec![7u8; payload_len],
    }
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("pdx_encode");
    let serializer = PdxSerializer::new(Arc::new(PdxTypeRegistry::new()));

    for size in [16usize, 1024, 64 * 1024] {
        let value = trade(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &value, |b, value| {
            b.iter(|| black_box(serializer.serialize(black_box(value)).unwrap()))
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("pdx_decode");
    let serializer = PdxSerializer::new(Arc::new(PdxTypeRegistry::new()));

    for size in [16usize, 1024, 64 * 1024] {
        let bytes = serializer.serialize(&trade(size)).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter(|| black_box(serializer.deserialize::<Trade>(black_box(bytes)).unwrap()))
        });
    }

    group.finish();
}

fn bench_remote_decode(c: &mut Criterion) {
    let writer = PdxTypeRegistry::new();
    let written = PdxInstance::from_object(&writer, &trade(64)).unwrap();
    let remote = PdxType::clone(&writer.resolve(written.type_id()).unwrap()).with_type_id(900);
    let bytes = PdxInstance::new(900, written.body().to_vec()).to_bytes();

    let registry = Arc::new(PdxTypeRegistry::new());
    PdxInstance::from_object(
        &registry,
        &TradeSummary {
            id: 0,
            price: 0.0,
        },
    )
    .unwrap();
    registry.register_remote_type(remote).unwrap();
    let serializer = PdxSerializer::new(registry);

    c.bench_function("pdx_decode_other_schema", |b| {
        b.iter(|| black_box(serializer.deserialize::<TradeSummary>(black_box(&bytes)).unwrap()))
    });
}

fn bench_field_access(c: &mut Criterion) {
    let registry = PdxTypeRegistry::new();
    let instance = PdxInstance::from_object(&registry, &trade(1024)).unwrap();

    c.bench_function("pdx_single_field", |b| {
        b.iter(|| black_box(instance.field(&registry, black_box("qty")).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_remote_decode,
    bench_field_access,
);

criterion_main!(benches);
