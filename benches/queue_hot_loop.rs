use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cmdrt::prelude::{BlockingQueue, CommandRef, Executor, command};

/// Push `total` commands from `producers` threads through one executor and
/// time until the worker has drained them all.
fn run_hot_loop(total: u64, producers: u64) -> Duration {
    let queue = BlockingQueue::new();
    let exec = Executor::new(queue.clone());
    let done = Arc::new(AtomicU64::new(0));

    let cmd: CommandRef = {
        let done = done.clone();
        command(move || {
            done.fetch_add(black_box(1), Ordering::Relaxed);
            Ok(())
        })
    };

    let start = Instant::now();
    exec.start().unwrap();

    let per_producer = total / producers;
    let handles: Vec<_> = (0..producers)
        .map(|_| {
            let queue = queue.clone();
            let cmd = cmd.clone();
            thread::spawn(move || {
                for _ in 0..per_producer {
                    queue.push(cmd.clone());
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    exec.soft_stop();
    exec.join().unwrap();
    let elapsed = start.elapsed();

    assert_eq!(done.load(Ordering::Relaxed), per_producer * producers);
    elapsed
}

pub fn bench_hot_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("executor_hot_loop");

    for &producers in &[1_u64, 4] {
        for &total in &[100_000_u64, 1_000_000_u64] {
            group.bench_function(
                BenchmarkId::new(format!("producers_{producers}"), total),
                |b| {
                    b.iter_custom(|n| {
                        let mut elapsed = Duration::ZERO;
                        for _ in 0..n {
                            elapsed += run_hot_loop(total, producers);
                        }
                        elapsed
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(3))
        .sample_size(12);
    targets = bench_hot_loop
}
criterion_main!(benches);
