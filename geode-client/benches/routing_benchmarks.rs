//! Routing lookup and local region benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use geode_client::{
    bucket_for_key, BucketServerLocation, ClientMetadata, LocalRegion, RegionAttributes,
    ServerLocation,
};
use geode_core::{PdxTypeRegistry, Value};

fn metadata(total: u32) -> ClientMetadata {
    let md = ClientMetadata::new("bench", total);
    for bucket in 0..total {
        let locations = (0..3)
            .map(|i| {
                BucketServerLocation::new(
                    ServerLocation::new(format!("server-{}", (bucket + i) % 8), 40404),
                    bucket,
                    i == 0,
                    1,
                )
            })
            .collect();
        md.update_bucket_server_locations(bucket, locations).unwrap();
    }
    md
}

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    let md = metadata(113);
    let keys: Vec<Value> = (0..1024).map(|i| Value::String(format!("key-{}", i))).collect();
    let registry = PdxTypeRegistry::new();

    group.bench_function("bucket_for_key", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            black_box(bucket_for_key(&md, black_box(&keys[i]), None, &registry).unwrap())
        })
    });

    group.bench_function("primary_location", |b| {
        let mut bucket = 0;
        b.iter(|| {
            bucket = (bucket + 1) % 113;
            black_box(md.get_server_location(black_box(bucket), true).unwrap())
        })
    });

    group.bench_function("any_location", |b| {
        let mut bucket = 0;
        b.iter(|| {
            bucket = (bucket + 1) % 113;
            black_box(md.get_server_location(black_box(bucket), false).unwrap())
        })
    });

    group.finish();
}

fn bench_region(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_region");
    let attrs = RegionAttributes::builder()
        .lru_entries_limit(10_000)
        .build()
        .unwrap();

    group.bench_function("put_with_eviction", |b| {
        let region: LocalRegion<u64, u64> = LocalRegion::new("bench", &attrs);
        let mut key = 0u64;
        b.iter(|| {
            key += 1;
            region.put(black_box(key), key);
        })
    });

    group.bench_function("get_hit", |b| {
        let region: LocalRegion<u64, u64> = LocalRegion::new("bench", &attrs);
        for key in 0..10_000u64 {
            region.put(key, key);
        }
        let mut key = 0u64;
        b.iter(|| {
            key = (key + 7) % 10_000;
            black_box(region.get(black_box(&key)))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_routing, bench_region);
criterion_main!(benches);
