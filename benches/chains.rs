//! Performance benchmarks for chain construction.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashMap;

use crchains::{BlockPointer, CrChains, EntryType, Operation, Revision, WriterId};

/// Generates a causally chained revision range where each revision creates
/// one file in one of `dir_count` directories, rotating round robin.
fn make_revisions(revision_count: usize, dir_count: usize) -> Vec<Revision> {
    let mut counter: u64 = 0;
    let mut mint = move || {
        counter += 1;
        BlockPointer::from_bytes(&counter.to_le_bytes())
    };

    let root = mint();
    let dirs: Vec<BlockPointer> = (0..dir_count).map(|_| mint()).collect();
    let mut current: HashMap<BlockPointer, BlockPointer> =
        std::iter::once(root).chain(dirs.iter().copied()).map(|p| (p, p)).collect();

    let mut revisions = Vec::with_capacity(revision_count);
    for i in 0..revision_count {
        let dir = dirs[i % dir_count];
        let mut op = Operation::create(format!("file{}", i), current[&dir], EntryType::File);
        for original in [root, dir] {
            let unref = current[&original];
            let fresh = mint();
            op.add_update(unref, fresh).unwrap();
            current.insert(original, fresh);
        }
        let mut rev = Revision::new(WriterId(1), current[&root]);
        rev.add_op(op);
        revisions.push(rev);
    }
    revisions
}

/// Benchmark chain construction with varying range lengths
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_build");

    for revision_count in [10, 100, 1000] {
        let revisions = make_revisions(revision_count, 8);
        group.bench_with_input(
            BenchmarkId::new("revisions", revision_count),
            &revisions,
            |b, revisions| {
                b.iter(|| {
                    black_box(CrChains::build(revisions, None, true).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark bounded construction against a pre-built reference range
fn bench_build_bounded(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_build_bounded");

    for revision_count in [100, 1000] {
        let reference = CrChains::build(&make_revisions(revision_count, 8), None, true).unwrap();
        let revisions = make_revisions(revision_count, 8);
        group.bench_with_input(
            BenchmarkId::new("revisions", revision_count),
            &revisions,
            |b, revisions| {
                b.iter(|| {
                    black_box(CrChains::build(revisions, Some(&reference), true).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark most-recent lookups across a large chain set
fn bench_lookup(c: &mut Criterion) {
    let revisions = make_revisions(1000, 64);
    let chains = CrChains::build(&revisions, None, true).unwrap();
    let tails: Vec<BlockPointer> = chains.chains().map(|c| c.most_recent()).collect();

    c.bench_function("chain_lookup_by_most_recent", |b| {
        b.iter(|| {
            for &tail in &tails {
                black_box(chains.chain_by_most_recent(tail).unwrap());
            }
        });
    });
}

criterion_group!(benches, bench_build, bench_build_bounded, bench_lookup);

criterion_main!(benches);
