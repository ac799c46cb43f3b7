use chrono::NaiveDate;
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use dayseq::{
    CounterStore, FileStore, FixedDate, LockSerialAllocator, MemoryStore, Prefix, SerialAllocator,
};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

// Number of serials allocated per benchmark iteration (split across threads
// for contended runs).
const TOTAL_SERIALS: usize = 512;

fn today() -> FixedDate {
    FixedDate(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap())
}

fn prefix() -> Prefix {
    Prefix::new("ORG").unwrap()
}

/// Single-threaded allocation throughput.
fn bench_sequential<S: CounterStore>(
    c: &mut Criterion,
    group_name: &str,
    store_fn: impl Fn() -> S,
) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_SERIALS as u64));

    group.bench_function(format!("elems/{TOTAL_SERIALS}"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let allocator = LockSerialAllocator::new(prefix(), store_fn(), today());
                for _ in 0..TOTAL_SERIALS {
                    black_box(allocator.try_allocate().unwrap());
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// All threads allocate against the same date, so every call contends on
/// one day lock.
fn bench_contended<S: CounterStore>(c: &mut Criterion, group_name: &str, store_fn: impl Fn() -> S) {
    let mut group = c.benchmark_group(group_name);
    let mut thread_counts = vec![1, 2, 4];
    thread_counts.push(num_cpus::get().max(8));

    for thread_count in thread_counts {
        let per_thread = TOTAL_SERIALS / thread_count;

        group.throughput(Throughput::Elements((per_thread * thread_count) as u64));
        group.bench_function(
            format!("elems/{TOTAL_SERIALS}/threads/{thread_count}"),
            |b| {
                b.iter_custom(|iters| {
                    let start = Instant::now();
                    for _ in 0..iters {
                        let allocator =
                            Arc::new(LockSerialAllocator::new(prefix(), store_fn(), today()));
                        let barrier = Arc::new(Barrier::new(thread_count + 1));
                        scope(|s| {
                            for _ in 0..thread_count {
                                let allocator = Arc::clone(&allocator);
                                let barrier = Arc::clone(&barrier);
                                s.spawn(move || {
                                    barrier.wait();
                                    for _ in 0..per_thread {
                                        black_box(allocator.try_allocate().unwrap());
                                    }
                                });
                            }
                            barrier.wait();
                        });
                    }
                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_memory_sequential(c: &mut Criterion) {
    bench_sequential(c, "memory/sequential", MemoryStore::new);
}

fn benchmark_memory_contended(c: &mut Criterion) {
    bench_contended(c, "memory/contended", MemoryStore::new);
}

// Every allocation fsyncs, so these measure the disk more than the code.
fn benchmark_file_sequential(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    bench_sequential(c, "file/sequential", || {
        FileStore::open(tempfile::tempdir_in(dir.path()).unwrap().keep()).unwrap()
    });
}

fn benchmark_file_contended(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    bench_contended(c, "file/contended", || {
        FileStore::open(tempfile::tempdir_in(dir.path()).unwrap().keep()).unwrap()
    });
}

criterion_group!(
    benches,
    benchmark_memory_sequential,
    benchmark_memory_contended,
    benchmark_file_sequential,
    benchmark_file_contended,
);
criterion_main!(benches);
