// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::queue::job_queue::JobQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

/// 队列维护器
///
/// 后台维护循环：回收过期租约，让停摆工作器持有的任务
/// 回到等待集。实际的任务分发由Worker通过lease主动拉取
pub struct QueueMaintenance<Q: JobQueue + 'static> {
    queue: Arc<Q>,
    /// 维护间隔
    tick: Duration,
}

impl<Q: JobQueue + 'static> QueueMaintenance<Q> {
    /// 创建队列维护器
    ///
    /// # 参数
    ///
    /// * `queue` - 任务队列
    /// * `tick` - 维护间隔
    pub fn new(queue: Arc<Q>, tick: Duration) -> Self {
        Self { queue, tick }
    }

    /// 启动维护后台任务
    ///
    /// # 返回值
    ///
    /// 返回后台任务的句柄
    pub fn start(&self) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let tick = self.tick;

        tokio::spawn(async move {
            let mut interval = interval(tick);

            loop {
                interval.tick().await;

                match queue.reap_expired_leases().await {
                    Ok(count) => {
                        if count > 0 {
                            info!("Reaped {} expired leases", count);
                        }
                    }
                    Err(e) => {
                        error!("Failed to reap expired leases: {}", e);
                    }
                }

                match queue.stats().await {
                    Ok(stats) => {
                        debug!(
                            "Queue maintenance tick: {} waiting, {} leased, {} dead",
                            stats.waiting, stats.leased, stats.dead_lettered
                        );
                    }
                    Err(e) => {
                        error!("Failed to read queue stats: {}", e);
                    }
                }
            }
        })
    }

    /// 启动时的一次性恢复
    ///
    /// 回收所有超期租约后再放工作器进场
    pub async fn recover(&self) -> u64 {
        match self.queue.reap_expired_leases().await {
            Ok(count) => {
                if count > 0 {
                    info!("Recovery reaped {} stale leases", count);
                }
                count
            }
            Err(e) => {
                error!("Recovery failed to reap leases: {}", e);
                0
            }
        }
    }
}
