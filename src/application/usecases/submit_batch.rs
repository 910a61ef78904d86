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

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::application::dto::batch_request::{BatchCheckRequestDto, BatchSubmitResponseDto};
use crate::domain::models::event::NotifyEventKind;
use crate::domain::models::job::Job;
use crate::domain::models::link::{Link, LinkKind};
use crate::domain::repositories::link_repository::{LinkRepository, RepositoryError};
use crate::domain::repositories::user_repository::UserRepository;
use crate::domain::services::notifier::{publish_kind, Notifier};
use crate::queue::job_queue::{JobQueue, QueueError};
use crate::utils::url_utils::normalise_target_domain;
use crate::utils::validators::{validate_source_url, ValidationError};

/// 批量提交错误类型
#[derive(Error, Debug)]
pub enum SubmitError {
    /// 请求结构无效
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// 单项输入无效（入队前拒绝）
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] ValidationError),
    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    /// 队列后端不可用
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// 批量提交用例
///
/// 临时批量生产者：校验 → 重置批量纪元 → 建行 → 入队。
/// 无效输入在入队前被整体拒绝，不会产生半个批次
pub struct SubmitBatchUseCase {
    queue: Arc<dyn JobQueue>,
    link_repo: Arc<dyn LinkRepository>,
    user_repo: Arc<dyn UserRepository>,
    notifier: Arc<dyn Notifier>,
}

impl SubmitBatchUseCase {
    /// 创建批量提交用例
    pub fn new(
        queue: Arc<dyn JobQueue>,
        link_repo: Arc<dyn LinkRepository>,
        user_repo: Arc<dyn UserRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            queue,
            link_repo,
            user_repo,
            notifier,
        }
    }

    /// 执行批量提交
    ///
    /// # 参数
    ///
    /// * `request` - 批量审核请求
    ///
    /// # 返回值
    ///
    /// * `Ok(BatchSubmitResponseDto)` - 入队摘要
    /// * `Err(SubmitError)` - 校验失败或后端不可用
    #[instrument(skip(self, request), fields(project = %request.project_id))]
    pub async fn execute(
        &self,
        request: BatchCheckRequestDto,
    ) -> Result<BatchSubmitResponseDto, SubmitError> {
        request
            .validate()
            .map_err(|e| SubmitError::InvalidRequest(e.to_string()))?;

        // 逐项深度校验，malformed_input在入队前整体拒绝
        let mut prepared = Vec::new();
        for item in &request.items {
            let url = validate_source_url(&item.source_url)?;
            let target = normalise_target_domain(&item.target_domain).ok_or_else(|| {
                ValidationError::InvalidTargetDomain(item.target_domain.clone())
            })?;
            prepared.push((url.to_string(), target, item.target_domain.clone()));
        }

        let total = prepared.len();

        // 请求内按来源URL折叠，一个URL一个任务
        let mut seen = HashSet::new();
        prepared.retain(|(url, _, _)| seen.insert(url.clone()));
        let deduplicated = total - prepared.len();

        let priority = self.user_repo.get_user_priority(request.user_id).await?;

        // 重置步骤开启本轮纪元
        self.link_repo
            .reset_analysis(request.project_id, LinkKind::Batch)
            .await?;

        let _ = publish_kind(
            self.notifier.as_ref(),
            request.project_id,
            NotifyEventKind::AnalysisStarted,
            json!({ "projectId": request.project_id, "total": prepared.len() }),
        )
        .await;

        // 先建全部行再入队，完成检查在整轮内保持单调
        let mut links = Vec::new();
        for (url, target, original) in &prepared {
            let link = Link::new(
                request.project_id,
                url.clone(),
                target.clone(),
                original.clone(),
                LinkKind::Batch,
            );
            self.link_repo.upsert_link(&link).await?;
            links.push(link);
        }

        let mut enqueued = 0;
        for link in &links {
            let job = Job::new_batch(
                request.user_id,
                request.project_id,
                link.id,
                link.source_url.clone(),
                link.target_domain.clone(),
                priority,
            );
            match self.queue.enqueue(job).await {
                Ok(()) => enqueued += 1,
                Err(e) => {
                    warn!("Enqueue failed mid-batch: {}", e);
                    let _ = publish_kind(
                        self.notifier.as_ref(),
                        request.project_id,
                        NotifyEventKind::AnalysisError,
                        json!({ "projectId": request.project_id, "error": e.to_string() }),
                    )
                    .await;
                    return Err(e.into());
                }
            }
        }

        info!(
            "Batch submitted for project {}: {} enqueued, {} deduplicated",
            request.project_id, enqueued, deduplicated
        );

        Ok(BatchSubmitResponseDto {
            total,
            enqueued,
            deduplicated,
        })
    }
}
