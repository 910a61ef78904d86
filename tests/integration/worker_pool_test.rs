// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use backlinkrs::application::dto::batch_request::{BatchCheckRequestDto, BatchItemDto};
use backlinkrs::application::usecases::submit_batch::SubmitBatchUseCase;
use backlinkrs::domain::models::event::NotifyEventKind;
use backlinkrs::domain::models::job::Priority;
use backlinkrs::domain::models::link::{LinkClass, LinkState};
use backlinkrs::domain::services::link_analyser::{AnalyserConfig, LinkAnalyser};
use backlinkrs::domain::services::notifier::Notifier;
use backlinkrs::infrastructure::services::broadcast_notifier::BroadcastNotifier;
use backlinkrs::queue::job_queue::JobQueue;
use backlinkrs::queue::memory_queue::MemoryJobQueue;
use backlinkrs::workers::link_worker::LinkWorkerConfig;
use backlinkrs::workers::manager::WorkerManager;

use super::helpers::{DisabledProxy, FixedUserRepo, MemoryLinkRepo, ScriptedRenderEngine};

fn fast_analyser_config() -> AnalyserConfig {
    AnalyserConfig {
        render_timeout: Duration::from_secs(2),
        settle: Duration::ZERO,
        reload_settle: Duration::ZERO,
        scroll_wait: Duration::ZERO,
        max_redirects: 5,
        proxy_retry_attempts: 2,
        proxy_timeout: Duration::from_secs(1),
        overall_deadline: Duration::from_secs(10),
    }
}

fn fast_worker_config() -> LinkWorkerConfig {
    LinkWorkerConfig {
        lease_timeout: Duration::from_secs(10),
        idle_sleep: Duration::from_millis(10),
    }
}

/// 端到端：提交批量请求，单工作器排空，检查事件序与终态
#[tokio::test]
async fn test_batch_run_to_completion() {
    let queue = Arc::new(MemoryJobQueue::default());
    let link_repo = Arc::new(MemoryLinkRepo::new());
    let notifier = Arc::new(BroadcastNotifier::new());
    let engine = Arc::new(ScriptedRenderEngine::new());

    engine.serve(
        "https://blog.example/with-link",
        200,
        r#"<html><body><a rel="" href="https://target.com/x">x</a></body></html>"#,
    );
    engine.serve(
        "https://blog.example/without-link",
        200,
        "<html><body>nothing here</body></html>",
    );

    let analyser = Arc::new(LinkAnalyser::new(
        engine,
        Arc::new(DisabledProxy),
        fast_analyser_config(),
    ));

    let project_id = Uuid::new_v4();
    let mut events = notifier.subscribe(project_id);

    let submit = SubmitBatchUseCase::new(
        queue.clone(),
        link_repo.clone(),
        Arc::new(FixedUserRepo::with(Priority::new(2))),
        notifier.clone(),
    );
    let response = submit
        .execute(BatchCheckRequestDto {
            project_id,
            user_id: Uuid::new_v4(),
            items: vec![
                BatchItemDto {
                    source_url: "https://blog.example/with-link".to_string(),
                    target_domain: "www.Target.com".to_string(),
                },
                BatchItemDto {
                    source_url: "https://blog.example/without-link".to_string(),
                    target_domain: "target.com".to_string(),
                },
            ],
        })
        .await
        .unwrap();
    assert_eq!(response.enqueued, 2);

    let mut manager = WorkerManager::new(
        queue.clone(),
        link_repo.clone(),
        notifier.clone() as Arc<dyn Notifier>,
        analyser,
        fast_worker_config(),
        Duration::from_secs(2),
    );
    manager.start_workers(1);

    // 收事件直到completed，整体限时
    let mut kinds = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .expect("run did not complete in time")
            .expect("event channel closed");
        kinds.push(event.kind);
        if event.kind == NotifyEventKind::AnalysisCompleted {
            break;
        }
    }

    // analysis_started先于任何link_updated，completed收尾且恰好一次
    assert_eq!(kinds[0], NotifyEventKind::AnalysisStarted);
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == NotifyEventKind::LinkUpdated)
            .count(),
        2
    );
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == NotifyEventKind::AnalysisCompleted)
            .count(),
        1
    );
    assert_eq!(*kinds.last().unwrap(), NotifyEventKind::AnalysisCompleted);

    // 终态行恰好各一
    let links = link_repo.all();
    assert_eq!(links.len(), 2);
    let with_link = links
        .iter()
        .find(|l| l.source_url.ends_with("with-link"))
        .unwrap();
    assert_eq!(with_link.state, LinkState::Ok);
    assert_eq!(with_link.link_class, Some(LinkClass::Dofollow));
    assert_eq!(with_link.response_code, Some(200));
    // 目标域名已规范化，原始输入保留
    assert_eq!(with_link.target_domain, "target.com");
    assert_eq!(with_link.original_target_domain, "www.Target.com");

    let without_link = links
        .iter()
        .find(|l| l.source_url.ends_with("without-link"))
        .unwrap();
    assert_eq!(without_link.state, LinkState::Problem);
    assert_eq!(without_link.link_class, Some(LinkClass::Absent));

    // 队列清空
    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.leased, 0);
    assert_eq!(stats.completed, 2);

    manager.shutdown().await;
}

/// 渲染彻底失败且无代理：任务重试后死信，行以inconclusive落终态
#[tokio::test]
async fn test_unreachable_page_dead_letters_with_inconclusive_verdict() {
    let queue = Arc::new(MemoryJobQueue::new(
        backlinkrs::queue::memory_queue::MemoryQueueConfig {
            max_attempts: 2,
            backoff_base: Duration::from_millis(0),
            ..Default::default()
        },
    ));
    let link_repo = Arc::new(MemoryLinkRepo::new());
    let notifier = Arc::new(BroadcastNotifier::new());
    // 不登记任何页面：渲染全部失败
    let engine = Arc::new(ScriptedRenderEngine::new());

    let analyser = Arc::new(LinkAnalyser::new(
        engine,
        Arc::new(DisabledProxy),
        fast_analyser_config(),
    ));

    let project_id = Uuid::new_v4();
    let submit = SubmitBatchUseCase::new(
        queue.clone(),
        link_repo.clone(),
        Arc::new(FixedUserRepo::with(Priority::new(4))),
        notifier.clone(),
    );
    submit
        .execute(BatchCheckRequestDto {
            project_id,
            user_id: Uuid::new_v4(),
            items: vec![BatchItemDto {
                source_url: "https://unreachable.example/page".to_string(),
                target_domain: "target.com".to_string(),
            }],
        })
        .await
        .unwrap();

    let mut events = notifier.subscribe(project_id);

    let mut manager = WorkerManager::new(
        queue.clone(),
        link_repo.clone(),
        notifier.clone() as Arc<dyn Notifier>,
        analyser,
        fast_worker_config(),
        Duration::from_secs(2),
    );
    manager.start_workers(1);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .expect("run did not finish in time")
            .expect("event channel closed");
        if event.kind == NotifyEventKind::AnalysisCompleted {
            break;
        }
    }

    // 死信可观测且不复活
    let dead = queue.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);

    // 行落终态：problem/absent，原因inconclusive，终局写恰好一次
    let links = link_repo.all();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].state, LinkState::Problem);
    assert_eq!(links[0].link_class, Some(LinkClass::Absent));
    assert_eq!(links[0].non_indexable_reason.as_deref(), Some("inconclusive"));

    manager.shutdown().await;
}
