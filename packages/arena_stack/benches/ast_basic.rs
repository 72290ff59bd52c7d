//! Basic benchmarks for the `arena_stack` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::time::Instant;

use arena_stack::{ArenaPool, ArenaVec, BumpVec, CappedVec};
use criterion::{Criterion, criterion_group, criterion_main};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

type TestItem = u64;
const TEST_VALUE: TestItem = 1024;

const ITEM_COUNT: usize = 10_000;

fn entrypoint(c: &mut Criterion) {
    let pool = ArenaPool::builder().arena_size(64 * 1024 * 1024).build();

    let mut group = c.benchmark_group("ast_basic");

    group.bench_function("create_empty", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(ArenaVec::<TestItem>::new_in(&pool)));
            }

            start.elapsed()
        });
    });

    group.bench_function("push_access_pop_arena_vec", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let mut items = ArenaVec::<TestItem>::new_in(&pool);
                push_access_pop(&mut items);
            }

            start.elapsed()
        });
    });

    group.bench_function("push_access_pop_capped_vec", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let mut items = CappedVec::<TestItem>::with_capacity_in(&pool, ITEM_COUNT);
                push_access_pop(&mut items);
            }

            start.elapsed()
        });
    });

    group.bench_function("push_access_pop_std_vec", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let mut items = Vec::<TestItem>::new();

                for _ in 0..ITEM_COUNT {
                    items.push(black_box(TEST_VALUE));
                }

                for i in 0..ITEM_COUNT {
                    _ = black_box(items.get(i));
                }

                while items.pop().is_some() {}

                black_box(&items);
            }

            start.elapsed()
        });
    });

    group.finish();
}

fn push_access_pop<B>(items: &mut BumpVec<'_, TestItem, B>) {
    for _ in 0..ITEM_COUNT {
        items.push_back(black_box(TEST_VALUE));
    }

    for i in 0..ITEM_COUNT {
        _ = black_box(items.get(i));
    }

    while !items.is_empty() {
        items.pop_back();
    }

    black_box(&items);
}
