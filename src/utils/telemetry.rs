// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_histogram, Unit};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 初始化日志与指标
///
/// chromiumoxide的CDP事件日志非常吵，默认压到warn
pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,backlinkrs=debug,chromiumoxide=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    describe_metrics();
}

/// 注册指标元信息；导出器由外层进程按需接线
fn describe_metrics() {
    describe_counter!(
        "queue_jobs_enqueued_total",
        "Jobs accepted into the waiting set"
    );
    describe_counter!("queue_jobs_leased_total", "Jobs handed to workers");
    describe_counter!(
        "queue_jobs_completed_total",
        "Jobs finished and released from their lease"
    );
    describe_counter!(
        "queue_jobs_retried_total",
        "Jobs re-enqueued with exponential backoff"
    );
    describe_counter!(
        "queue_jobs_dead_lettered_total",
        "Jobs that exhausted their retry budget"
    );
    describe_counter!(
        "queue_leases_reaped_total",
        "Expired leases returned to the waiting set"
    );
    describe_counter!(
        "worker_jobs_processed_total",
        "Jobs picked up by the worker pool"
    );
    describe_counter!(
        "worker_runs_completed_total",
        "Project runs fully drained"
    );
    describe_histogram!(
        "worker_analyse_duration_seconds",
        Unit::Seconds,
        "End-to-end analyser wall time per job"
    );
}
