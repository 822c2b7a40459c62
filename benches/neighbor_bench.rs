//! Build-versus-refresh cost of the neighbor pipeline.
//!
//! The point of the Verlet split is that `update(false)` is far cheaper
//! than gathering candidates; this bench keeps the ratio honest.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use glam::DVec3;
use nsearch3d::{CellList, NeighborTable, VerletList};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn cloud(n: usize, seed: u64) -> Vec<DVec3> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            DVec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
        })
        .collect()
}

fn bench_neighbors(c: &mut Criterion) {
    let cutoff = 0.08;
    let points = cloud(20_000, 7);

    c.bench_function("cell_list_build_20k", |b| {
        b.iter_batched(
            || points.clone(),
            |points| CellList::new(black_box(cutoff), points),
            BatchSize::SmallInput,
        )
    });

    let (_, list) = CellList::new(cutoff, points);

    c.bench_function("candidate_gather_20k", |b| {
        b.iter(|| NeighborTable::new(black_box(&list)))
    });

    let verlet = VerletList::new(&list);
    c.bench_function("verlet_trim_20k", |b| {
        b.iter_batched(
            || verlet.clone(),
            |mut v| {
                v.update(false, &list);
                v
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_neighbors);
criterion_main!(benches);
