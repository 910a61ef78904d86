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

use anyhow::Result;
use metrics::{counter, histogram};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::event::NotifyEventKind;
use crate::domain::models::job::Job;
use crate::domain::models::link::{Link, LinkClass, LinkKind, LinkState};
use crate::domain::models::verdict::{LinkStatus, Verdict};
use crate::domain::repositories::link_repository::LinkRepository;
use crate::domain::services::link_analyser::{AnalyserError, LinkAnalyser};
use crate::domain::services::notifier::{publish_kind, Notifier};
use crate::queue::job_queue::{FailOutcome, JobQueue};
use crate::utils::retry_policy::is_retryable_error;

/// 工作器配置
#[derive(Debug, Clone)]
pub struct LinkWorkerConfig {
    /// 租约时长
    pub lease_timeout: Duration,
    /// 队列为空时的小睡
    pub idle_sleep: Duration,
}

impl Default for LinkWorkerConfig {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_millis(90_000),
            idle_sleep: Duration::from_millis(100),
        }
    }
}

/// 链接分析工作器
///
/// 循环执行 lease → analyse → persist → notify → complete/fail，
/// 工作器之间除队列、仓库与通知器外不共享状态
pub struct LinkWorker<Q, R>
where
    Q: JobQueue + Send + Sync,
    R: LinkRepository + Send + Sync,
{
    queue: Arc<Q>,
    repository: Arc<R>,
    notifier: Arc<dyn Notifier>,
    analyser: Arc<LinkAnalyser>,
    config: LinkWorkerConfig,
    /// 优雅停机：false后不再租约新任务
    accepting: Arc<AtomicBool>,
    worker_id: Uuid,
}

impl<Q, R> LinkWorker<Q, R>
where
    Q: JobQueue + Send + Sync,
    R: LinkRepository + Send + Sync,
{
    /// 创建链接分析工作器
    pub fn new(
        queue: Arc<Q>,
        repository: Arc<R>,
        notifier: Arc<dyn Notifier>,
        analyser: Arc<LinkAnalyser>,
        config: LinkWorkerConfig,
        accepting: Arc<AtomicBool>,
    ) -> Self {
        Self {
            queue,
            repository,
            notifier,
            analyser,
            config,
            accepting,
            worker_id: Uuid::new_v4(),
        }
    }

    /// 运行工作器循环
    pub async fn run(&self) {
        info!("Link worker {} started", self.worker_id);

        while self.accepting.load(Ordering::Relaxed) {
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => sleep(self.config.idle_sleep).await,
                Err(e) if is_retryable_error(&e) => {
                    warn!("Worker {} transient error: {}", self.worker_id, e);
                    sleep(self.config.idle_sleep).await;
                }
                Err(e) => {
                    // 持续性的后端故障不值得热转，多睡一会再探
                    error!("Worker {} error processing job: {}", self.worker_id, e);
                    sleep(self.config.idle_sleep * 10).await;
                }
            }
        }

        info!("Link worker {} stopped accepting work", self.worker_id);
    }

    async fn process_next(&self) -> Result<bool> {
        let job = self
            .queue
            .lease(self.worker_id, self.config.lease_timeout)
            .await?;

        if let Some(job) = job {
            self.process_job(job).await?;
            return Ok(true);
        }

        Ok(false)
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id, url = %job.source_url, worker = %self.worker_id))]
    async fn process_job(&self, job: Job) -> Result<()> {
        debug!("Processing job");
        counter!("worker_jobs_processed_total").increment(1);

        let link_id = job.payload.link_id();
        let link = match self.repository.get_link(link_id).await? {
            Some(link) => link,
            None => {
                // 行已被下一轮重置删除：任务作废，不产出裁定
                warn!("Link row {} is gone, dropping job {}", link_id, job.job_id);
                self.queue.complete(job.job_id).await?;
                return Ok(());
            }
        };

        if link.state == LinkState::Pending {
            match link.clone().start() {
                Ok(running) => {
                    self.repository.upsert_link(&running).await?;
                }
                Err(e) => {
                    warn!("Cannot start link {}: {}", link_id, e);
                }
            }
        }

        let started = std::time::Instant::now();
        let outcome = self
            .analyser
            .analyse(&job.source_url, &job.target_domain)
            .await;
        histogram!("worker_analyse_duration_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(verdict) => {
                self.persist_and_notify(&job, &verdict).await?;
                self.queue.complete(job.job_id).await?;
                self.check_completion(&job).await;
            }
            Err(AnalyserError::Inconclusive(reason)) => {
                warn!("Job {} inconclusive: {}", job.job_id, reason);
                let outcome = self.queue.fail(job.job_id, &reason).await?;

                if outcome == FailOutcome::DeadLetter {
                    // 重试预算耗尽才落终态：problem/absent，原因inconclusive
                    let verdict = inconclusive_verdict();
                    self.persist_and_notify(&job, &verdict).await?;
                    self.check_completion(&job).await;
                }
            }
        }

        Ok(())
    }

    /// 单次事务性整行写入，然后发布link_updated
    async fn persist_and_notify(&self, job: &Job, verdict: &Verdict) -> Result<()> {
        let link_id = job.payload.link_id();

        let link = match self.repository.get_link(link_id).await? {
            Some(link) => link,
            None => {
                warn!("Link row {} vanished before verdict write", link_id);
                return Ok(());
            }
        };

        let updated = apply_verdict(link, verdict);
        self.repository.upsert_link(&updated).await?;

        let event_kind = match job.kind() {
            LinkKind::Batch => NotifyEventKind::LinkUpdated,
            LinkKind::Sheet => NotifyEventKind::SheetsLinkUpdated,
        };
        let payload = verdict.wire_payload(job.project_id, link_id);
        if let Err(e) = publish_kind(
            self.notifier.as_ref(),
            job.project_id,
            event_kind,
            serde_json::to_value(&payload).unwrap_or_default(),
        )
        .await
        {
            // 投递尽力而为，失败只记日志
            warn!("Failed to publish link update: {}", e);
        }

        Ok(())
    }

    /// 项目批次完成检查
    ///
    /// 队列无未收尾任务且仓库无pending/running行时，本工作器
    /// 恰好是收尾者，发布completed；否则发布progress
    async fn check_completion(&self, job: &Job) {
        let kind = job.kind();

        let outstanding = match self.queue.has_outstanding(job.project_id, kind).await {
            Ok(outstanding) => outstanding,
            Err(e) => {
                error!("Completion check failed on queue: {}", e);
                return;
            }
        };

        let unfinished_rows = match self
            .repository
            .count_in_states(
                job.project_id,
                kind,
                &[LinkState::Pending, LinkState::Running],
            )
            .await
        {
            Ok(count) => count,
            Err(e) => {
                error!("Completion check failed on repository: {}", e);
                return;
            }
        };

        let (completed_kind, progress_kind) = match kind {
            LinkKind::Batch => (
                NotifyEventKind::AnalysisCompleted,
                NotifyEventKind::AnalysisProgress,
            ),
            LinkKind::Sheet => (
                NotifyEventKind::SheetsAnalysisCompleted,
                NotifyEventKind::SheetsAnalysisProgress,
            ),
        };

        if !outstanding && unfinished_rows == 0 {
            info!("Project {} {} run completed", job.project_id, kind);
            counter!("worker_runs_completed_total").increment(1);
            let _ = publish_kind(
                self.notifier.as_ref(),
                job.project_id,
                completed_kind,
                json!({ "projectId": job.project_id, "kind": kind.to_string() }),
            )
            .await;
        } else {
            let _ = publish_kind(
                self.notifier.as_ref(),
                job.project_id,
                progress_kind,
                json!({
                    "projectId": job.project_id,
                    "kind": kind.to_string(),
                    "remaining": unfinished_rows,
                }),
            )
            .await;
        }
    }
}

/// 把裁定套用到链接行，容忍重复投递
fn apply_verdict(link: Link, verdict: &Verdict) -> Link {
    match link.clone().record_verdict(verdict) {
        Ok(updated) => updated,
        Err(_) => {
            // 行不在Running态（例如租约回收后的迟到写入）：
            // 终态行保持不变，pending行先启动再记录
            if link.state == LinkState::Pending {
                if let Ok(running) = link.clone().start() {
                    if let Ok(updated) = running.record_verdict(verdict) {
                        return updated;
                    }
                }
            }
            link
        }
    }
}

/// 两层抓取都失败后的兜底裁定
fn inconclusive_verdict() -> Verdict {
    Verdict {
        status: LinkStatus::Problem,
        response_code: 0,
        indexable: true,
        link_class: LinkClass::Absent,
        canonical_url: None,
        load_time_ms: 0,
        matched_anchor_html: None,
        non_indexable_reason: Some("inconclusive".to_string()),
        checked_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inconclusive_verdict_shape() {
        let verdict = inconclusive_verdict();
        assert_eq!(verdict.status, LinkStatus::Problem);
        assert_eq!(verdict.link_class, LinkClass::Absent);
        assert_eq!(verdict.non_indexable_reason.as_deref(), Some("inconclusive"));
        assert_eq!(verdict.response_code, 0);
    }

    #[test]
    fn test_apply_verdict_from_running() {
        let link = Link::new(
            Uuid::new_v4(),
            "https://s/p".to_string(),
            "target.com".to_string(),
            "target.com".to_string(),
            LinkKind::Batch,
        )
        .start()
        .unwrap();

        let updated = apply_verdict(link, &inconclusive_verdict());
        assert_eq!(updated.state, LinkState::Problem);
    }

    #[test]
    fn test_apply_verdict_terminal_row_untouched() {
        let link = Link::new(
            Uuid::new_v4(),
            "https://s/p".to_string(),
            "target.com".to_string(),
            "target.com".to_string(),
            LinkKind::Batch,
        )
        .start()
        .unwrap();
        let terminal = apply_verdict(link, &inconclusive_verdict());
        let checked_at = terminal.checked_at;

        // 终态行不被迟到的裁定覆盖
        let again = apply_verdict(terminal, &inconclusive_verdict());
        assert_eq!(again.checked_at, checked_at);
    }
}
