use criterion::{criterion_group, Criterion};
use ewah::EwahBitmap;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::hint::black_box;

fn build(seed: u64, size: u32, density: f64) -> EwahBitmap {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bitmap = EwahBitmap::new();
    for index in 0..size {
        if rng.gen_bool(density) {
            bitmap.append_set(index);
        }
    }
    bitmap.resize(size, false);
    bitmap
}

fn pairwise(c: &mut Criterion, size: u32, density: f64) {
    let a = build(10, size, density);
    let b = build(11, size, density);

    c.bench_function(
        &format!("{}/fn=and size={size} density={density}", module_path!()),
        |bench| {
            bench.iter(|| black_box(a.and(&b)));
        },
    );
    c.bench_function(
        &format!("{}/fn=or size={size} density={density}", module_path!()),
        |bench| {
            bench.iter(|| black_box(a.or(&b)));
        },
    );
    c.bench_function(
        &format!("{}/fn=xor size={size} density={density}", module_path!()),
        |bench| {
            bench.iter(|| black_box(a.xor(&b)));
        },
    );
    c.bench_function(
        &format!("{}/fn=and_not size={size} density={density}", module_path!()),
        |bench| {
            bench.iter(|| black_box(a.and_not(&b)));
        },
    );
    c.bench_function(
        &format!("{}/fn=and_count size={size} density={density}", module_path!()),
        |bench| {
            bench.iter(|| black_box(a.and_count(&b)));
        },
    );
}

fn bench_pairwise(c: &mut Criterion) {
    for size in [1 << 16, 1 << 20] {
        pairwise(c, size, 0.001);
        pairwise(c, size, 0.5);
    }
}

fn or_all(c: &mut Criterion, size: u32, operands: usize) {
    let bitmaps: Vec<EwahBitmap> = (0..operands)
        .map(|i| build(20 + i as u64, size, 0.01))
        .collect();
    let refs: Vec<&EwahBitmap> = bitmaps.iter().collect();

    c.bench_function(
        &format!("{}/fn=or_all size={size} operands={operands}", module_path!()),
        |bench| {
            bench.iter(|| black_box(EwahBitmap::or_all(&refs)));
        },
    );
    c.bench_function(
        &format!(
            "{}/fn=or_chained size={size} operands={operands}",
            module_path!()
        ),
        |bench| {
            bench.iter(|| {
                let mut result = bitmaps[0].clone();
                for operand in &refs[1..] {
                    result = result.or(operand);
                }
                black_box(result)
            });
        },
    );
}

fn bench_or_all(c: &mut Criterion) {
    for operands in [4, 16] {
        or_all(c, 1 << 18, operands);
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_pairwise, bench_or_all,
}
