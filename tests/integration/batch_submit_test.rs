// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use uuid::Uuid;

use backlinkrs::application::dto::batch_request::{BatchCheckRequestDto, BatchItemDto};
use backlinkrs::application::usecases::submit_batch::{SubmitBatchUseCase, SubmitError};
use backlinkrs::domain::models::job::Priority;
use backlinkrs::domain::models::link::LinkState;
use backlinkrs::infrastructure::services::broadcast_notifier::BroadcastNotifier;
use backlinkrs::queue::job_queue::JobQueue;
use backlinkrs::queue::memory_queue::MemoryJobQueue;

use super::helpers::{FixedUserRepo, MemoryLinkRepo};

fn use_case(
    queue: Arc<MemoryJobQueue>,
    link_repo: Arc<MemoryLinkRepo>,
) -> SubmitBatchUseCase {
    SubmitBatchUseCase::new(
        queue,
        link_repo,
        Arc::new(FixedUserRepo::with(Priority::new(3))),
        Arc::new(BroadcastNotifier::new()),
    )
}

fn item(url: &str, target: &str) -> BatchItemDto {
    BatchItemDto {
        source_url: url.to_string(),
        target_domain: target.to_string(),
    }
}

/// 无效URL在入队前被整体拒绝，不产生半个批次
#[tokio::test]
async fn test_malformed_input_rejected_before_enqueue() {
    let queue = Arc::new(MemoryJobQueue::default());
    let link_repo = Arc::new(MemoryLinkRepo::new());
    let submit = use_case(queue.clone(), link_repo.clone());

    let result = submit
        .execute(BatchCheckRequestDto {
            project_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            items: vec![
                item("https://good.example/page", "target.com"),
                item("ftp://bad.example/file", "target.com"),
            ],
        })
        .await;

    assert!(matches!(result, Err(SubmitError::InvalidRequest(_) | SubmitError::MalformedInput(_))));
    assert_eq!(queue.stats().await.unwrap().waiting, 0);
    assert!(link_repo.all().is_empty());
}

/// 内网地址被SSRF防护拒绝
#[tokio::test]
async fn test_loopback_source_rejected() {
    let queue = Arc::new(MemoryJobQueue::default());
    let link_repo = Arc::new(MemoryLinkRepo::new());
    let submit = use_case(queue.clone(), link_repo.clone());

    let result = submit
        .execute(BatchCheckRequestDto {
            project_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            items: vec![item("http://127.0.0.1/admin", "target.com")],
        })
        .await;

    assert!(matches!(result, Err(SubmitError::MalformedInput(_))));
    assert_eq!(queue.stats().await.unwrap().waiting, 0);
}

/// 请求内重复URL折叠为一个任务
#[tokio::test]
async fn test_duplicate_urls_fold_into_one_job() {
    let queue = Arc::new(MemoryJobQueue::default());
    let link_repo = Arc::new(MemoryLinkRepo::new());
    let submit = use_case(queue.clone(), link_repo.clone());

    let response = submit
        .execute(BatchCheckRequestDto {
            project_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            items: vec![
                item("https://blog.example/page", "target.com"),
                item("https://blog.example/page", "target.com"),
                item("https://blog.example/other", "target.com"),
            ],
        })
        .await
        .unwrap();

    assert_eq!(response.total, 3);
    assert_eq!(response.enqueued, 2);
    assert_eq!(response.deduplicated, 1);
    assert_eq!(queue.stats().await.unwrap().waiting, 2);
    assert_eq!(link_repo.all().len(), 2);
}

/// 重复提交建立新纪元：旧批量行被重置清除
#[tokio::test]
async fn test_resubmit_resets_batch_epoch() {
    let queue = Arc::new(MemoryJobQueue::default());
    let link_repo = Arc::new(MemoryLinkRepo::new());
    let submit = use_case(queue.clone(), link_repo.clone());
    let project_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    submit
        .execute(BatchCheckRequestDto {
            project_id,
            user_id,
            items: vec![item("https://blog.example/old", "target.com")],
        })
        .await
        .unwrap();
    assert_eq!(link_repo.all().len(), 1);

    submit
        .execute(BatchCheckRequestDto {
            project_id,
            user_id,
            items: vec![item("https://blog.example/new", "target.com")],
        })
        .await
        .unwrap();

    // 旧行被重置删除，只剩新纪元的行
    let links = link_repo.all();
    assert_eq!(links.len(), 1);
    assert!(links[0].source_url.ends_with("new"));
    assert_eq!(links[0].state, LinkState::Pending);
}
