use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ldict::hosh::{Etype, Hosh};
use ldict::identity::field_hosh;
use ldict::{Function, Ldict};
use serde_json::json;

fn bench_hosh_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("hosh_ops");

    // Deterministic elements for stable benches
    let a = Hosh::from_bytes(Etype::Ordered, b"alpha");
    let b = Hosh::from_bytes(Etype::Ordered, b"beta");
    let h = Hosh::from_bytes(Etype::Hybrid, b"gamma");

    group.bench_function("mul", |bencher| bencher.iter(|| black_box(a) * black_box(b)));

    group.bench_function("inv", |bencher| bencher.iter(|| black_box(a).inv()));

    group.bench_function("pow_u64", |bencher| {
        bencher.iter(|| black_box(h).pow(black_box(0xdead_beef_cafe_babe)))
    });

    group.bench_function("id_encode", |bencher| bencher.iter(|| black_box(a).id()));

    let id = a.id();
    group.bench_function("id_decode", |bencher| {
        bencher.iter(|| Hosh::from_id(black_box(&id)).unwrap())
    });

    group.bench_function("field_hosh", |bencher| {
        let value = json!({"values": [1, 2, 3], "name": "x"});
        bencher.iter(|| field_hosh(black_box("field"), black_box(&value)).unwrap())
    });

    group.finish();
}

fn bench_container_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("container_build");

    for n in [8usize, 64, 256] {
        group.bench_with_input(BenchmarkId::new("insert", n), &n, |bencher, &n| {
            bencher.iter(|| {
                let mut d = Ldict::new();
                for i in 0..n {
                    d = d.insert(&format!("f{i}"), json!(i)).unwrap();
                }
                black_box(d)
            })
        });
    }

    let f = Function::builder("inc")
        .input("f0")
        .output("f0")
        .build(|args| Ok(json!({"f0": args.i64("f0")? + 1})))
        .unwrap();
    let base = Ldict::from_pairs((0..64).map(|i| (format!("f{i}"), json!(i)))).unwrap();
    group.bench_function("apply_64", |bencher| {
        bencher.iter(|| black_box(&base).apply(&f).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_hosh_ops, bench_container_build);
criterion_main!(benches);
