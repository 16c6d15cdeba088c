use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use residue_core::MillerRabin;
use safe_residues::generate::SafePrimeSearch;
use safe_residues::{CountOnly, LiftEngine, LiftOptions, ResidueSet};

const CHAIN: [u64; 8] = [2, 3, 5, 7, 11, 13, 17, 19];

fn level(n: usize) -> ResidueSet {
    LiftEngine::default()
        .lift_chain(&ResidueSet::trivial(), &CHAIN[..n])
        .ok()
        .and_then(|mut levels| levels.pop())
        .unwrap_or_else(ResidueSet::trivial)
}

fn quiet(parallel: bool) -> LiftEngine {
    LiftEngine::new(LiftOptions {
        progress_interval: 0,
        parallel,
    })
}

fn bench_lift(c: &mut Criterion) {
    let mut group = c.benchmark_group("lift");
    group.sample_size(10);

    for n in [5usize, 6, 7] {
        let set = level(n);
        let prime = CHAIN[n];
        group.bench_with_input(BenchmarkId::new("sequential", set.modulus()), &set, |b, s| {
            let engine = quiet(false);
            b.iter(|| engine.lift(s, prime));
        });
        group.bench_with_input(BenchmarkId::new("parallel", set.modulus()), &set, |b, s| {
            let engine = quiet(true);
            b.iter(|| engine.lift(s, prime));
        });
        group.bench_with_input(BenchmarkId::new("count_only", set.modulus()), &set, |b, s| {
            let engine = quiet(false);
            b.iter(|| engine.lift_into(s.iter().copied(), None, s.modulus(), prime, &mut CountOnly));
        });
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("safe_prime_search");
    group.sample_size(10);
    let oracle = MillerRabin::new(8);
    let search = SafePrimeSearch::new(&oracle);
    let set = level(5);

    group.bench_function("naive", |b| b.iter(|| search.naive(1_000_000, 20)));
    group.bench_function("residue_filtered", |b| {
        b.iter(|| search.residue_filtered(1_000_000, 20, &set))
    });

    group.finish();
}

criterion_group!(benches, bench_lift, bench_search);
criterion_main!(benches);
