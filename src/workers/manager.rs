// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::domain::repositories::link_repository::LinkRepository;
use crate::domain::services::link_analyser::LinkAnalyser;
use crate::domain::services::notifier::Notifier;
use crate::queue::job_queue::JobQueue;
use crate::workers::link_worker::{LinkWorker, LinkWorkerConfig};

/// 工作管理器
///
/// 固定规模的工作器池：启动N个工作器，优雅停机时先停止
/// 租约，给在途任务一个排空窗口，超时后强制中止
pub struct WorkerManager<Q, R>
where
    Q: JobQueue + 'static,
    R: LinkRepository + 'static,
{
    queue: Arc<Q>,
    repository: Arc<R>,
    notifier: Arc<dyn Notifier>,
    analyser: Arc<LinkAnalyser>,
    worker_config: LinkWorkerConfig,
    /// 排空窗口
    drain_grace: Duration,
    accepting: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl<Q, R> WorkerManager<Q, R>
where
    Q: JobQueue + Send + Sync,
    R: LinkRepository + Send + Sync,
{
    /// 创建工作管理器
    pub fn new(
        queue: Arc<Q>,
        repository: Arc<R>,
        notifier: Arc<dyn Notifier>,
        analyser: Arc<LinkAnalyser>,
        worker_config: LinkWorkerConfig,
        drain_grace: Duration,
    ) -> Self {
        Self {
            queue,
            repository,
            notifier,
            analyser,
            worker_config,
            drain_grace,
            accepting: Arc::new(AtomicBool::new(true)),
            handles: Vec::new(),
        }
    }

    /// 启动工作器
    ///
    /// # 参数
    ///
    /// * `count` - 要启动的工作器数量
    pub fn start_workers(&mut self, count: usize) {
        for _ in 0..count {
            let worker = LinkWorker::new(
                self.queue.clone(),
                self.repository.clone(),
                self.notifier.clone(),
                self.analyser.clone(),
                self.worker_config.clone(),
                self.accepting.clone(),
            );

            let handle = tokio::spawn(async move {
                worker.run().await;
            });
            self.handles.push(handle);
        }
        info!("Started {} link workers", count);
    }

    /// 等待关闭信号并优雅停机
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }

        self.shutdown().await;
    }

    /// 优雅停机
    ///
    /// 停止接受租约 → 排空窗口内等在途任务收尾 → 强制中止
    pub async fn shutdown(&mut self) {
        info!("Draining workers...");
        self.accepting.store(false, Ordering::Relaxed);

        let deadline = tokio::time::Instant::now() + self.drain_grace;
        let handles: Vec<JoinHandle<()>> = self.handles.drain(..).collect();

        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(
                        "Drain grace of {:?} expired, aborting in-flight worker",
                        self.drain_grace
                    );
                    handle.abort();
                }
            }
        }

        info!("Workers shut down");
    }
}
