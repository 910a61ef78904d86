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

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::event::NotifyEventKind;
use crate::domain::models::job::Job;
use crate::domain::models::link::{Link, LinkKind, LinkState};
use crate::domain::models::sheet::{CheckInterval, Sheet, SheetStatus};
use crate::domain::repositories::link_repository::{LinkRepository, RepositoryError};
use crate::domain::repositories::sheet_repository::SheetRepository;
use crate::domain::repositories::user_repository::UserRepository;
use crate::domain::services::notifier::{publish_kind, Notifier};
use crate::queue::job_queue::{JobQueue, QueueError};
use crate::sheets::adapter::{RowOutcome, SheetAdapter};
use crate::sheets::client::SheetError;
use crate::utils::validators::validate_source_url;

/// 调度器错误类型
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    /// 队列错误
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    /// 表格服务错误
    #[error("Sheet service error: {0}")]
    Sheet(#[from] SheetError),
    /// 表格不存在
    #[error("Sheet {0} not found")]
    SheetNotFound(Uuid),
    /// 一轮运行超时
    #[error("Sheet run exceeded deadline")]
    RunTimeout,
}

/// 调度器配置
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 完成轮询间隔
    pub poll_interval: Duration,
    /// 单轮运行截止
    pub run_deadline: Duration,
    /// 冷启动时错过的触发至少延后这么多
    pub bootstrap_epsilon: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            run_deadline: Duration::from_secs(15 * 60),
            bootstrap_epsilon: Duration::from_secs(1),
        }
    }
}

/// 调度表条目
///
/// 每个活跃表格至多一个；定时器句柄归调度器所有
pub struct ScheduledTask {
    pub sheet_id: Uuid,
    pub interval: CheckInterval,
    pub next_fire_at: DateTime<Utc>,
    pub last_fire_at: Option<DateTime<Utc>>,
    pub fire_count: u64,
    handle: JoinHandle<()>,
}

/// 周期调度器
///
/// 单进程调度器：每个活跃表格一个定时器，触发时读表、
/// 入队、等收尾、回写并重新布防
pub struct RecurringScheduler {
    sheet_repo: Arc<dyn SheetRepository>,
    link_repo: Arc<dyn LinkRepository>,
    user_repo: Arc<dyn UserRepository>,
    queue: Arc<dyn JobQueue>,
    adapter: Arc<SheetAdapter>,
    notifier: Arc<dyn Notifier>,
    tasks: DashMap<Uuid, ScheduledTask>,
    config: SchedulerConfig,
}

impl RecurringScheduler {
    /// 创建周期调度器
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sheet_repo: Arc<dyn SheetRepository>,
        link_repo: Arc<dyn LinkRepository>,
        user_repo: Arc<dyn UserRepository>,
        queue: Arc<dyn JobQueue>,
        adapter: Arc<SheetAdapter>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            sheet_repo,
            link_repo,
            user_repo,
            queue,
            adapter,
            notifier,
            tasks: DashMap::new(),
            config,
        })
    }

    /// 冷启动：从仓库装载活跃表格并布防定时器
    ///
    /// 每个定时器布防到`max(next_run, now + ε)`
    pub async fn bootstrap(self: Arc<Self>) -> Result<usize, SchedulerError> {
        let sheets = self.sheet_repo.list_active_sheets().await?;
        let now = Utc::now();
        let earliest = now
            + chrono::Duration::milliseconds(self.config.bootstrap_epsilon.as_millis() as i64);

        let mut armed = 0;
        for sheet in sheets {
            if !sheet.is_schedulable() {
                continue;
            }
            let stored: Option<DateTime<Utc>> = sheet.next_run.map(|t| t.with_timezone(&Utc));
            let fire_at = stored.map(|t| t.max(earliest)).unwrap_or(earliest);
            self.clone().arm(&sheet, fire_at);
            armed += 1;
        }

        info!("Scheduler bootstrapped {} sheet timers", armed);
        Ok(armed)
    }

    /// 为表格布防（或重新布防）定时器
    ///
    /// 同一表格的旧定时器先取消；至多一个
    pub fn arm(self: Arc<Self>, sheet: &Sheet, fire_at: DateTime<Utc>) {
        let (last_fire_at, fire_count) = self
            .tasks
            .remove(&sheet.id)
            .map(|(_, task)| {
                task.handle.abort();
                (task.last_fire_at, task.fire_count)
            })
            .unwrap_or((None, 0));

        let delay = (fire_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let scheduler = self.clone();
        let sheet_id = sheet.id;

        let handle = tokio::spawn(async move {
            sleep(delay).await;
            scheduler.fire(sheet_id).await;
        });

        debug!("Armed sheet {} to fire at {}", sheet.id, fire_at);
        self.tasks.insert(
            sheet.id,
            ScheduledTask {
                sheet_id: sheet.id,
                interval: sheet.interval,
                next_fire_at: fire_at,
                last_fire_at,
                fire_count,
                handle,
            },
        );
    }

    /// 表格激活入口
    ///
    /// 计算下次触发时间、布防并把投影写回`Sheet.next_run`。
    /// `manual`间隔从不布防
    pub async fn schedule_sheet(self: Arc<Self>, sheet: &Sheet) -> Result<(), SchedulerError> {
        let next = match sheet.interval.next_fire_from(Utc::now()) {
            Some(next) => next,
            None => return Ok(()),
        };

        self.clone().arm(sheet, next);

        let mut updated = sheet.clone();
        updated.next_run = Some(next.into());
        self.sheet_repo.update_sheet(&updated).await?;
        Ok(())
    }

    /// 取消表格调度
    ///
    /// 删除定时器并置`inactive`；在途任务不撤销，自然排空
    pub async fn cancel(&self, sheet_id: Uuid) -> Result<(), SchedulerError> {
        self.cancel_timer(sheet_id);
        self.sheet_repo
            .update_status(sheet_id, SheetStatus::Inactive)
            .await?;
        info!("Sheet {} schedule cancelled", sheet_id);
        Ok(())
    }

    /// 仅删除定时器
    pub fn cancel_timer(&self, sheet_id: Uuid) {
        if let Some((_, task)) = self.tasks.remove(&sheet_id) {
            task.handle.abort();
        }
    }

    /// 停止调度器
    ///
    /// 返回前取消所有定时器句柄
    pub fn stop(&self) {
        let ids: Vec<Uuid> = self.tasks.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.cancel_timer(id);
        }
        info!("Scheduler stopped, all timers cancelled");
    }

    /// 当前调度表快照（表格ID与下次触发时间）
    pub fn armed_tasks(&self) -> Vec<(Uuid, DateTime<Utc>)> {
        self.tasks
            .iter()
            .map(|entry| (entry.sheet_id, entry.next_fire_at))
            .collect()
    }

    /// 定时器触发入口
    async fn fire(self: Arc<Self>, sheet_id: Uuid) {
        if let Some(mut task) = self.tasks.get_mut(&sheet_id) {
            task.last_fire_at = Some(Utc::now());
            task.fire_count += 1;
        }

        if let Err(e) = self.run_sheet(sheet_id).await {
            error!("Sheet {} run failed: {}", sheet_id, e);
        }
    }

    /// 执行一轮表格运行
    ///
    /// 失败路径：表格置`error`，发布错误事件，不重新布防
    #[instrument(skip(self))]
    pub async fn run_sheet(self: Arc<Self>, sheet_id: Uuid) -> Result<(), SchedulerError> {
        let sheet = self
            .sheet_repo
            .get_sheet(sheet_id)
            .await?
            .ok_or(SchedulerError::SheetNotFound(sheet_id))?;

        match self.clone().execute_run(&sheet).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Sheet {} run errored: {}", sheet_id, e);
                self.cancel_timer(sheet_id);
                if let Err(repo_err) = self
                    .sheet_repo
                    .update_status(sheet_id, SheetStatus::Error)
                    .await
                {
                    error!("Failed to mark sheet {} as errored: {}", sheet_id, repo_err);
                }
                let _ = publish_kind(
                    self.notifier.as_ref(),
                    sheet.project_id,
                    NotifyEventKind::SheetsAnalysisError,
                    json!({
                        "projectId": sheet.project_id,
                        "sheetId": sheet_id,
                        "error": e.to_string(),
                    }),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn execute_run(self: Arc<Self>, sheet: &Sheet) -> Result<(), SchedulerError> {
        info!("Sheet {} run starting", sheet.id);

        self.sheet_repo
            .update_status(sheet.id, SheetStatus::Analysing)
            .await?;
        let _ = publish_kind(
            self.notifier.as_ref(),
            sheet.project_id,
            NotifyEventKind::SheetsAnalysisStarted,
            json!({ "projectId": sheet.project_id, "sheetId": sheet.id }),
        )
        .await;

        // 读输入列
        let read = self.adapter.read(sheet).await?;
        debug!(
            "Sheet {} read {} rows ({} unique urls)",
            sheet.id, read.total_rows, read.unique_urls
        );

        // 本轮以表格为准：旧的sheet行先清掉，开启新纪元
        self.link_repo
            .reset_analysis(sheet.project_id, LinkKind::Sheet)
            .await?;

        // 优先级每轮触发时按表格所有者解析一次
        let priority = self.user_repo.get_user_priority(sheet.user_id).await?;

        // 先建全部行再入队，完成检查在整轮内保持单调。
        // 每个有效URL恰好一个任务：重复行不建行，避免纪元内永远收不了尾
        let mut seen_urls = std::collections::HashSet::new();
        let mut created: Vec<Link> = Vec::new();
        for row in &read.rows {
            if let Err(e) = validate_source_url(&row.url) {
                warn!("Sheet {} row {} skipped: {}", sheet.id, row.row_index, e);
                continue;
            }
            if !seen_urls.insert(row.url.clone()) {
                debug!("Sheet {} row {} duplicates an earlier url", sheet.id, row.row_index);
                continue;
            }

            let link = Link::new(
                sheet.project_id,
                row.url.clone(),
                row.target.clone(),
                row.original_target.clone(),
                LinkKind::Sheet,
            )
            .with_sheet(sheet.id, row.row_index);

            self.link_repo.upsert_link(&link).await?;
            created.push(link);
        }

        for link in &created {
            let row_index = link.row_index.unwrap_or(0);
            let job = Job::new_sheet(
                sheet.user_id,
                sheet.project_id,
                link.id,
                sheet.id,
                row_index,
                link.source_url.clone(),
                link.target_domain.clone(),
                priority,
            );
            self.queue.enqueue(job).await?;
        }

        if created.is_empty() {
            // 空轮没有工作器收尾，完成事件由调度器补发
            let _ = publish_kind(
                self.notifier.as_ref(),
                sheet.project_id,
                NotifyEventKind::SheetsAnalysisCompleted,
                json!({ "projectId": sheet.project_id, "sheetId": sheet.id }),
            )
            .await;
        } else {
            self.await_run_completion(sheet).await?;
        }

        // 按表格行号聚合回写
        let links = self
            .link_repo
            .list_by_project_and_kind(sheet.project_id, LinkKind::Sheet)
            .await?;
        let mut outcomes: Vec<RowOutcome> = links
            .iter()
            .filter(|l| l.sheet_id == Some(sheet.id))
            .filter_map(RowOutcome::from_link)
            .collect();
        outcomes.sort_by_key(|o| o.row_index);

        self.adapter.write_verdicts(sheet, &outcomes).await?;
        self.adapter.format(sheet, &outcomes).await;

        // 收尾与重新布防
        let now = Utc::now();
        let next = sheet.interval.next_fire_from(now);

        self.sheet_repo
            .update_status(sheet.id, SheetStatus::Checked)
            .await?;
        self.sheet_repo
            .record_run(sheet.id, now.into(), next.map(Into::into))
            .await?;

        if let Some(fire_at) = next {
            self.clone().arm(sheet, fire_at);
        }

        info!(
            "Sheet {} run finished: {} rows written, next run {:?}",
            sheet.id,
            outcomes.len(),
            next
        );
        Ok(())
    }

    /// 轮询等待本轮任务全部收尾
    async fn await_run_completion(&self, sheet: &Sheet) -> Result<(), SchedulerError> {
        let deadline = tokio::time::Instant::now() + self.config.run_deadline;

        loop {
            sleep(self.config.poll_interval).await;

            let outstanding = self
                .queue
                .has_outstanding(sheet.project_id, LinkKind::Sheet)
                .await?;
            let unfinished = self
                .link_repo
                .count_in_states(
                    sheet.project_id,
                    LinkKind::Sheet,
                    &[LinkState::Pending, LinkState::Running],
                )
                .await?;

            if !outstanding && unfinished == 0 {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(SchedulerError::RunTimeout);
            }
        }
    }
}
