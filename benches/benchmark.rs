// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 性能基准测试套件
//!
//! 针对任务队列的入队与租约路径，评估不同批量下的吞吐表现。

use backlinkrs::domain::models::job::{Job, Priority, UserPlan};
use backlinkrs::queue::job_queue::JobQueue;
use backlinkrs::queue::memory_queue::MemoryJobQueue;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::time::Duration;
use tokio::runtime::Runtime;
use uuid::Uuid;

fn make_job(i: usize, plan: UserPlan) -> Job {
    Job::new_batch(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        format!("https://bench.example/page/{}", i),
        "target.com".to_string(),
        Priority::from(plan),
    )
}

/// 基准测试：入队吞吐
fn benchmark_enqueue(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("queue_enqueue");
    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("enqueue", size), size, |b, &size| {
            b.iter(|| {
                let queue = MemoryJobQueue::default();
                rt.block_on(async {
                    for i in 0..size {
                        queue
                            .enqueue(black_box(make_job(i, UserPlan::Free)))
                            .await
                            .unwrap();
                    }
                });
            });
        });
    }
    group.finish();
}

/// 基准测试：混合优先级下的租约顺序
fn benchmark_lease(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("queue_lease");
    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("drain", size), size, |b, &size| {
            b.iter(|| {
                let queue = MemoryJobQueue::default();
                rt.block_on(async {
                    let plans = [
                        UserPlan::Free,
                        UserPlan::Pro,
                        UserPlan::Enterprise,
                        UserPlan::Starter,
                    ];
                    for i in 0..size {
                        queue
                            .enqueue(make_job(i, plans[i % plans.len()]))
                            .await
                            .unwrap();
                    }

                    let worker = Uuid::new_v4();
                    while let Some(job) = queue
                        .lease(worker, Duration::from_secs(90))
                        .await
                        .unwrap()
                    {
                        queue.complete(black_box(job.job_id)).await.unwrap();
                    }
                });
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_enqueue, benchmark_lease);
criterion_main!(benches);
