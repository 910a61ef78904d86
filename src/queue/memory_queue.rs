// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::job::Job;
use crate::domain::models::link::LinkKind;
use crate::queue::job_queue::{
    DeadLetter, FailOutcome, JobQueue, LeaseRecord, QueueError, QueueStats,
};
use crate::utils::retry_policy::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 队列配置
#[derive(Debug, Clone)]
pub struct MemoryQueueConfig {
    /// 最大尝试次数
    pub max_attempts: u32,
    /// 退避基数
    pub backoff_base: Duration,
    /// 是否按job_id去重
    pub dedup_by_job_id: bool,
    /// 完成尾部保留条数
    pub completed_retain: usize,
    /// 死信尾部保留条数
    pub failed_retain: usize,
}

impl Default for MemoryQueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            dedup_by_job_id: true,
            completed_retain: 100,
            failed_retain: 50,
        }
    }
}

/// 等待集排序键
///
/// `(priority, enqueued_at, seq)`：优先级数值小者在前，
/// 同优先级按入队时间FIFO，seq保证全序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    priority: u8,
    enqueued_at: DateTime<Utc>,
    seq: u64,
}

/// 等待集条目
struct WaitingEntry {
    job: Job,
    /// 退避期内不出队
    not_before: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct QueueState {
    /// 等待集，按排序键有序
    waiting: BTreeMap<OrderKey, WaitingEntry>,
    /// job_id -> 排序键，去重与定位用
    waiting_index: HashMap<Uuid, OrderKey>,
    /// 租约表
    leases: HashMap<Uuid, (LeaseRecord, Job)>,
    /// 租约中重复入队的任务，租约结束后补入队
    requeue_on_release: HashMap<Uuid, Job>,
    /// 完成尾部
    completed: Vec<(Uuid, DateTime<Utc>)>,
    /// 死信尾部
    dead: Vec<DeadLetter>,
    /// 入队序号
    next_seq: u64,
}

/// 进程内任务队列
///
/// 队列能力的显式实现：单把锁保证对`job_id`的写线性化，
/// 排序、去重、租约、退避重试与死信都在这里闭环
pub struct MemoryJobQueue {
    state: Mutex<QueueState>,
    config: MemoryQueueConfig,
    retry: RetryPolicy,
}

impl MemoryJobQueue {
    /// 创建队列
    pub fn new(config: MemoryQueueConfig) -> Self {
        let retry = RetryPolicy::queue(config.backoff_base);
        Self {
            state: Mutex::new(QueueState::default()),
            config,
            retry,
        }
    }

    fn insert_waiting(state: &mut QueueState, job: Job, not_before: Option<DateTime<Utc>>) {
        let key = OrderKey {
            priority: job.priority.value(),
            enqueued_at: job.enqueued_at,
            seq: state.next_seq,
        };
        state.next_seq += 1;
        state.waiting_index.insert(job.job_id, key);
        state.waiting.insert(key, WaitingEntry { job, not_before });
    }

    /// 释放租约后补入队等待中的重复提交
    fn flush_requeue(state: &mut QueueState, job_id: Uuid) {
        if let Some(job) = state.requeue_on_release.remove(&job_id) {
            if !state.waiting_index.contains_key(&job_id) {
                debug!("Requeueing duplicate submission for job {}", job_id);
                Self::insert_waiting(state, job, None);
            }
        }
    }

    fn trim_tails(state: &mut QueueState, config: &MemoryQueueConfig) {
        if state.completed.len() > config.completed_retain {
            let excess = state.completed.len() - config.completed_retain;
            state.completed.drain(0..excess);
        }
        if state.dead.len() > config.failed_retain {
            let excess = state.dead.len() - config.failed_retain;
            state.dead.drain(0..excess);
        }
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new(MemoryQueueConfig::default())
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        let mut state = self.state.lock();

        if self.config.dedup_by_job_id {
            // 等待集内去重：同ID再次入队是no-op
            if state.waiting_index.contains_key(&job.job_id) {
                debug!("Job {} already waiting, enqueue is a no-op", job.job_id);
                return Ok(());
            }

            // 租约中的ID：租约结束后补入队一次
            if state.leases.contains_key(&job.job_id) {
                state.requeue_on_release.entry(job.job_id).or_insert(job);
                return Ok(());
            }
        }

        counter!("queue_jobs_enqueued_total").increment(1);
        Self::insert_waiting(&mut state, job, None);
        Ok(())
    }

    async fn lease(&self, worker_id: Uuid, timeout: Duration) -> Result<Option<Job>, QueueError> {
        let mut state = self.state.lock();
        let now = Utc::now();

        // 取就绪集中排序最前的条目，退避期内的跳过
        let key = state
            .waiting
            .iter()
            .find(|(_, entry)| entry.not_before.map(|t| t <= now).unwrap_or(true))
            .map(|(key, _)| *key);

        let key = match key {
            Some(key) => key,
            None => return Ok(None),
        };

        let entry = state.waiting.remove(&key).expect("key taken from iteration");
        state.waiting_index.remove(&entry.job.job_id);

        let record = LeaseRecord {
            job_id: entry.job.job_id,
            worker_id,
            leased_at: now,
            expires_at: now + chrono::Duration::milliseconds(timeout.as_millis() as i64),
        };
        state.leases.insert(entry.job.job_id, (record, entry.job.clone()));

        counter!("queue_jobs_leased_total").increment(1);
        Ok(Some(entry.job))
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock();

        // 租约已被回收时静默成功
        if state.leases.remove(&job_id).is_none() {
            debug!("Complete for job {} without a live lease, ignoring", job_id);
            return Ok(());
        }

        state.completed.push((job_id, Utc::now()));
        counter!("queue_jobs_completed_total").increment(1);

        Self::flush_requeue(&mut state, job_id);
        Self::trim_tails(&mut state, &self.config);
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, reason: &str) -> Result<FailOutcome, QueueError> {
        let mut state = self.state.lock();

        let (_, mut job) = match state.leases.remove(&job_id) {
            Some(leased) => leased,
            None => {
                // 租约已被回收，任务要么已回到等待集要么已结束
                debug!("Fail for job {} without a live lease, ignoring", job_id);
                return Ok(FailOutcome::Retry {
                    next_attempt_at: Utc::now(),
                });
            }
        };

        if job.attempts + 1 < self.config.max_attempts {
            job.attempts += 1;
            let next_attempt_at = self.retry.ready_at(job.attempts, Utc::now());
            info!(
                "Job {} failed ({}), retry {}/{} at {}",
                job_id, reason, job.attempts, self.config.max_attempts, next_attempt_at
            );
            counter!("queue_jobs_retried_total").increment(1);
            Self::insert_waiting(&mut state, job, Some(next_attempt_at));
            // 重试本身占用该ID，挂起的重复提交作废
            state.requeue_on_release.remove(&job_id);
            Ok(FailOutcome::Retry { next_attempt_at })
        } else {
            warn!(
                "Job {} dead-lettered after {} attempts: {}",
                job_id,
                job.attempts + 1,
                reason
            );
            counter!("queue_jobs_dead_lettered_total").increment(1);
            state.dead.push(DeadLetter {
                job,
                reason: reason.to_string(),
                failed_at: Utc::now(),
            });
            Self::flush_requeue(&mut state, job_id);
            Self::trim_tails(&mut state, &self.config);
            Ok(FailOutcome::DeadLetter)
        }
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let state = self.state.lock();

        let mut per_priority: HashMap<u8, usize> = HashMap::new();
        for key in state.waiting.keys() {
            *per_priority.entry(key.priority).or_insert(0) += 1;
        }

        Ok(QueueStats {
            waiting: state.waiting.len(),
            leased: state.leases.len(),
            completed: state.completed.len(),
            dead_lettered: state.dead.len(),
            per_priority,
        })
    }

    async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<Job>, QueueError> {
        let state = self.state.lock();

        let mut jobs: Vec<Job> = state
            .waiting
            .values()
            .map(|entry| entry.job.clone())
            .filter(|job| job.project_id == project_id)
            .collect();
        jobs.extend(
            state
                .leases
                .values()
                .map(|(_, job)| job.clone())
                .filter(|job| job.project_id == project_id),
        );

        Ok(jobs)
    }

    async fn has_outstanding(
        &self,
        project_id: Uuid,
        kind: LinkKind,
    ) -> Result<bool, QueueError> {
        let state = self.state.lock();

        let in_waiting = state
            .waiting
            .values()
            .any(|entry| entry.job.project_id == project_id && entry.job.kind() == kind);
        if in_waiting {
            return Ok(true);
        }

        Ok(state
            .leases
            .values()
            .any(|(_, job)| job.project_id == project_id && job.kind() == kind))
    }

    async fn reap_expired_leases(&self) -> Result<u64, QueueError> {
        let mut state = self.state.lock();
        let now = Utc::now();

        let expired: Vec<Uuid> = state
            .leases
            .iter()
            .filter(|(_, (record, _))| record.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();

        let count = expired.len() as u64;
        for job_id in expired {
            if let Some((record, job)) = state.leases.remove(&job_id) {
                warn!(
                    "Reaping expired lease for job {} (worker {}, leased at {})",
                    job_id, record.worker_id, record.leased_at
                );
                // 停摆不等于失败：attempts原样回到等待集
                Self::insert_waiting(&mut state, job, None);
            }
        }

        if count > 0 {
            counter!("queue_leases_reaped_total").increment(count);
        }
        Ok(count)
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, QueueError> {
        let state = self.state.lock();
        Ok(state.dead.clone())
    }
}
