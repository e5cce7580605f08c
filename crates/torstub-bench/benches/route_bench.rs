//! connect()/socket() decision benchmarks.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use torstub_core::socket::{AF_INET, AF_INET6, AF_LOCAL};
use torstub_core::{route_connect, socket_domain};

fn sockaddr_in(port: u16) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf[0..2].copy_from_slice(&(AF_INET as u16).to_ne_bytes());
    buf[2..4].copy_from_slice(&port.to_be_bytes());
    buf[4..8].copy_from_slice(&[127, 0, 0, 1]);
    buf
}

fn bench_route_connect(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_connect");

    for (label, port) in [("socks", 9050u16), ("control", 9151), ("refused", 443)] {
        let addr = sockaddr_in(port);
        group.bench_with_input(BenchmarkId::new("inet", label), &addr, |b, addr| {
            b.iter(|| criterion::black_box(route_connect(Some(criterion::black_box(addr)))));
        });
    }

    let mut local = [0u8; 110];
    local[0..2].copy_from_slice(&(AF_LOCAL as u16).to_ne_bytes());
    group.bench_function("local_passthrough", |b| {
        b.iter(|| criterion::black_box(route_connect(Some(criterion::black_box(&local)))));
    });

    group.finish();
}

fn bench_socket_domain(c: &mut Criterion) {
    let mut group = c.benchmark_group("socket_domain");

    for domain in [AF_INET, AF_LOCAL, AF_INET6] {
        group.bench_with_input(BenchmarkId::from_parameter(domain), &domain, |b, &d| {
            b.iter(|| criterion::black_box(socket_domain(criterion::black_box(d))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_route_connect, bench_socket_domain);
criterion_main!(benches);
