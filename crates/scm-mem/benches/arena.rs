// Arena allocator benchmarks for the SCM arena.
//
// These benchmarks measure the cost of bump allocation and string
// duplication against a file-backed, fixed-address mapping. Each iteration
// opens a fresh temp file because the fixed address can only be mapped by
// one Arena at a time in this process.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use scm_mem::Arena;

fn fresh_arena(len: u64) -> (tempfile::NamedTempFile, Arena) {
    let file = tempfile::NamedTempFile::new().unwrap();
    file.as_file().set_len(len).unwrap();
    let arena = Arena::open(file.path(), true).unwrap();
    (file, arena)
}

/// Benchmark sequential allocations of different sizes.
fn bench_sequential_allocations(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_alloc");
    group.sample_size(50);

    for size in &[4, 16, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (_file, arena) = fresh_arena(16 * 1024 * 1024);
            b.iter(|| {
                arena.alloc(black_box(size)).unwrap();
            });
            arena.close().unwrap();
        });
    }

    group.finish();
}

/// Benchmark string duplication, the allocation pattern the index uses for
/// every newly-inserted word.
fn bench_strdup(c: &mut Criterion) {
    let mut group = c.benchmark_group("strdup");
    group.sample_size(50);

    for len in &[4usize, 16, 64] {
        let word = "w".repeat(*len);
        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, _| {
            let (_file, arena) = fresh_arena(16 * 1024 * 1024);
            b.iter(|| {
                arena.strdup(black_box(word.as_bytes())).unwrap();
            });
            arena.close().unwrap();
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sequential_allocations, bench_strdup);
criterion_main!(benches);
