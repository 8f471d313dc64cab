use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::net::Ipv4Addr;
use std::time::Instant;

use dns_delegate::cache::Cache;
use dns_wire::types::*;

fn make_rrs(size: usize, ttl: u32) -> (Vec<ResourceRecord>, Vec<(DomainName, RecordType)>) {
    let mut rrs = Vec::with_capacity(size);
    let mut queries = Vec::with_capacity(size);

    for i in 0..size {
        let name = DomainName::from_dotted_string(&format!("host-{i}.example.com.")).unwrap();
        rrs.push(ResourceRecord {
            name: name.clone(),
            rtype_with_data: RecordTypeWithData::A {
                address: Ipv4Addr::from(u32::try_from(i).unwrap()),
            },
            rclass: RecordClass::IN,
            ttl,
        });
        queries.push((name, RecordType::A));
    }

    (rrs, queries)
}

fn build_cache(size: usize, rrs: &[ResourceRecord]) -> Cache {
    let mut cache = Cache::with_desired_size(size);
    let now = Instant::now();
    for rr in rrs {
        cache.insert(now, rr);
    }
    cache
}

#[allow(non_snake_case)]
fn bench__insert__unique(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert/unique");
    for size in [1, 100, 1000] {
        let (rrs, _) = make_rrs(size, 300);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &rrs, |b, rrs| {
            b.iter(|| build_cache(size, rrs));
        });
    }
    group.finish();
}

#[allow(non_snake_case)]
fn bench__insert__duplicate(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert/duplicate");
    for size in [1, 100, 1000] {
        let rr = ResourceRecord {
            name: DomainName::from_dotted_string("www.example.com.").unwrap(),
            rtype_with_data: RecordTypeWithData::CNAME {
                cname: DomainName::from_dotted_string("target.example.com.").unwrap(),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        };
        let rrs = vec![rr; size];

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &rrs, |b, rrs| {
            b.iter(|| build_cache(size, rrs));
        });
    }
    group.finish();
}

#[allow(non_snake_case)]
fn bench__get__hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("get/hit");
    for size in [1, 100, 1000] {
        let (rrs, queries) = make_rrs(size, 300);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &rrs, |b, rrs| {
            b.iter_batched(
                || build_cache(size, rrs),
                |mut cache| {
                    let now = Instant::now();
                    for (name, rtype) in &queries {
                        cache.get(now, name, RecordClass::IN, *rtype);
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

#[allow(non_snake_case)]
fn bench__get__miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("get/miss");
    for size in [1, 100, 1000] {
        let (rrs, _) = make_rrs(size, 300);
        let name = DomainName::from_dotted_string("name.which.is.never.inserted.example.com.")
            .unwrap();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &rrs, |b, rrs| {
            b.iter_batched(
                || build_cache(size, rrs),
                |mut cache| {
                    let now = Instant::now();
                    for _ in 0..size {
                        cache.get(now, &name, RecordClass::IN, RecordType::A);
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench__insert__unique,
    bench__insert__duplicate,
    bench__get__hit,
    bench__get__miss
);
criterion_main!(benches);
