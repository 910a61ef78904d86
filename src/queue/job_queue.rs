// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::Job;
use crate::domain::models::link::LinkKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 存储后端不可达
    #[error("Queue backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// 租约记录
///
/// 工作器对任务的排他临时所有权
#[derive(Debug, Clone)]
pub struct LeaseRecord {
    pub job_id: Uuid,
    pub worker_id: Uuid,
    pub leased_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// 失败处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// 已按退避重新入队
    Retry {
        /// 重试就绪时间
        next_attempt_at: DateTime<Utc>,
    },
    /// 重试预算耗尽，移入死信
    DeadLetter,
}

/// 死信记录
///
/// 可观测，永不自动复活
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub job: Job,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// 队列统计
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    /// 等待中的任务数
    pub waiting: usize,
    /// 已租约的任务数
    pub leased: usize,
    /// 累计完成数（保留尾部）
    pub completed: usize,
    /// 死信数（保留尾部）
    pub dead_lettered: usize,
    /// 等待集按优先级分布
    pub per_priority: HashMap<u8, usize>,
}

/// 任务队列特质
///
/// 按`(priority asc, enqueued_at asc)`排序的持久多重集合；
/// 向工作器至多一次交接，带重试与死信
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 入队任务
    ///
    /// 在整个等待集上按`job_id`去重：重复入队等待中的ID是no-op；
    /// 租约中的ID在租约结束后补入队一次
    async fn enqueue(&self, job: Job) -> Result<(), QueueError>;

    /// 租约队首任务
    ///
    /// 原子移除就绪集中排序最前的任务并记录租约；
    /// 两个工作器绝不会拿到同一个任务
    ///
    /// # 参数
    ///
    /// * `worker_id` - 工作器ID
    /// * `timeout` - 租约时长
    async fn lease(&self, worker_id: Uuid, timeout: Duration) -> Result<Option<Job>, QueueError>;

    /// 完成任务，释放租约
    ///
    /// 租约已过期被回收时静默成功
    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// 任务失败
    ///
    /// 尝试次数未耗尽时按指数退避重新入队，否则移入死信
    async fn fail(&self, job_id: Uuid, reason: &str) -> Result<FailOutcome, QueueError>;

    /// 队列统计
    async fn stats(&self) -> Result<QueueStats, QueueError>;

    /// 列出项目相关的等待与租约中任务
    async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<Job>, QueueError>;

    /// 项目内指定来源类型是否还有未收尾的任务（等待或租约中）
    async fn has_outstanding(
        &self,
        project_id: Uuid,
        kind: LinkKind,
    ) -> Result<bool, QueueError>;

    /// 回收过期租约
    ///
    /// 停摆不等于失败：任务原样回到等待集，attempts不变
    async fn reap_expired_leases(&self) -> Result<u64, QueueError>;

    /// 死信列表
    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, QueueError>;
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for std::sync::Arc<T> {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        (**self).enqueue(job).await
    }

    async fn lease(&self, worker_id: Uuid, timeout: Duration) -> Result<Option<Job>, QueueError> {
        (**self).lease(worker_id, timeout).await
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        (**self).complete(job_id).await
    }

    async fn fail(&self, job_id: Uuid, reason: &str) -> Result<FailOutcome, QueueError> {
        (**self).fail(job_id, reason).await
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        (**self).stats().await
    }

    async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<Job>, QueueError> {
        (**self).list_by_project(project_id).await
    }

    async fn has_outstanding(
        &self,
        project_id: Uuid,
        kind: LinkKind,
    ) -> Result<bool, QueueError> {
        (**self).has_outstanding(project_id, kind).await
    }

    async fn reap_expired_leases(&self) -> Result<u64, QueueError> {
        (**self).reap_expired_leases().await
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, QueueError> {
        (**self).dead_letters().await
    }
}
