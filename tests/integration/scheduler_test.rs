// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use backlinkrs::domain::models::event::NotifyEventKind;
use backlinkrs::domain::models::job::Priority;
use backlinkrs::domain::models::sheet::{
    CheckInterval, ResultRange, Sheet, SheetStatus, SpreadsheetRef,
};
use backlinkrs::domain::services::link_analyser::{AnalyserConfig, LinkAnalyser};
use backlinkrs::domain::services::notifier::Notifier;
use backlinkrs::infrastructure::services::broadcast_notifier::BroadcastNotifier;
use backlinkrs::queue::memory_queue::MemoryJobQueue;
use backlinkrs::sheets::adapter::SheetAdapter;
use backlinkrs::sheets::client::CellColor;
use backlinkrs::sheets::scheduler::{RecurringScheduler, SchedulerConfig, SchedulerError};
use backlinkrs::workers::link_worker::LinkWorkerConfig;
use backlinkrs::workers::manager::WorkerManager;

use super::helpers::{
    DisabledProxy, FixedUserRepo, MemoryLinkRepo, MemorySheetRepo, MockSpreadsheetClient,
    ScriptedRenderEngine,
};

fn make_sheet(interval: CheckInterval) -> Sheet {
    Sheet::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        SpreadsheetRef {
            spreadsheet_id: "spreadsheet-1".to_string(),
            sheet_gid: 0,
        },
        "fallback.com".to_string(),
        "A".to_string(),
        "B".to_string(),
        ResultRange::from_start('H').unwrap(),
        interval,
    )
}

fn fast_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        poll_interval: Duration::from_millis(20),
        run_deadline: Duration::from_secs(10),
        bootstrap_epsilon: Duration::from_millis(50),
    }
}

fn fast_analyser(engine: Arc<ScriptedRenderEngine>) -> Arc<LinkAnalyser> {
    Arc::new(LinkAnalyser::new(
        engine,
        Arc::new(DisabledProxy),
        AnalyserConfig {
            render_timeout: Duration::from_secs(2),
            settle: Duration::ZERO,
            reload_settle: Duration::ZERO,
            scroll_wait: Duration::ZERO,
            max_redirects: 5,
            proxy_retry_attempts: 2,
            proxy_timeout: Duration::from_secs(1),
            overall_deadline: Duration::from_secs(10),
        },
    ))
}

/// 完整一轮表格运行：读表、入队、排空、按行号回写、着色、收尾
#[tokio::test]
async fn test_sheet_run_writes_back_by_row_index() {
    let queue = Arc::new(MemoryJobQueue::default());
    let link_repo = Arc::new(MemoryLinkRepo::new());
    let sheet_repo = Arc::new(MemorySheetRepo::new());
    let notifier = Arc::new(BroadcastNotifier::new());
    let engine = Arc::new(ScriptedRenderEngine::new());

    // 第2行有链接（行内目标），第3行无链接（回退默认目标）
    engine.serve(
        "https://blog.example/a",
        200,
        r#"<html><body><a href="https://target.com/ref">ref</a></body></html>"#,
    );
    engine.serve(
        "https://blog.example/b",
        200,
        "<html><body>no links</body></html>",
    );

    let client = Arc::new(MockSpreadsheetClient::new());
    client.set_column("A", vec!["https://blog.example/a", "https://blog.example/b"]);
    client.set_column("B", vec!["www.Target.com", ""]);

    let sheet = make_sheet(CheckInterval::Manual);
    let sheet_id = sheet.id;
    let project_id = sheet.project_id;
    sheet_repo.insert(sheet);

    let mut events = notifier.subscribe(project_id);

    let scheduler = RecurringScheduler::new(
        sheet_repo.clone(),
        link_repo.clone(),
        Arc::new(FixedUserRepo::with(Priority::new(1))),
        queue.clone(),
        Arc::new(SheetAdapter::new(client.clone())),
        notifier.clone(),
        fast_scheduler_config(),
    );

    let mut manager = WorkerManager::new(
        queue.clone(),
        link_repo.clone(),
        notifier.clone() as Arc<dyn Notifier>,
        fast_analyser(engine),
        LinkWorkerConfig {
            lease_timeout: Duration::from_secs(10),
            idle_sleep: Duration::from_millis(10),
        },
        Duration::from_secs(2),
    );
    manager.start_workers(1);

    scheduler.clone().run_sheet(sheet_id).await.unwrap();

    // 表格收尾：checked、计数、manual不再布防
    let sheet = sheet_repo.get(sheet_id).unwrap();
    assert_eq!(sheet.status, SheetStatus::Checked);
    assert_eq!(sheet.run_count, 1);
    assert!(sheet.last_run.is_some());
    assert!(sheet.next_run.is_none());
    assert!(scheduler.armed_tasks().is_empty());

    // 五列结果按行号回写
    let written = client.written.lock().clone();
    assert_eq!(written.len(), 1);
    let (range, values) = &written[0];
    assert_eq!(range, "H2:L3");
    assert_eq!(values.len(), 2);
    assert_eq!(values[0][0], "OK");
    assert_eq!(values[0][2], "Yes");
    assert!(values[0][4].starts_with("True ("));
    assert_eq!(values[1][0], "Problem");
    assert!(values[1][4].starts_with("False ("));

    // 着色：表头灰 + 第2行绿 + 第3行红
    let formats = client.formats.lock().clone();
    assert_eq!(formats.len(), 3);
    assert_eq!(formats[0].color, CellColor::Grey);
    assert_eq!(formats[1].color, CellColor::Green);
    assert_eq!(formats[2].color, CellColor::Red);

    // 事件：started恰好一次，completed恰好一次
    let mut started = 0;
    let mut completed = 0;
    while let Ok(event) = events.try_recv() {
        match event.kind {
            NotifyEventKind::SheetsAnalysisStarted => started += 1,
            NotifyEventKind::SheetsAnalysisCompleted => completed += 1,
            _ => {}
        }
    }
    assert_eq!(started, 1);
    assert_eq!(completed, 1);

    // 行内目标已规范化；空目标回退到表格默认值
    let links = link_repo.all();
    let row2 = links.iter().find(|l| l.row_index == Some(2)).unwrap();
    assert_eq!(row2.target_domain, "target.com");
    let row3 = links.iter().find(|l| l.row_index == Some(3)).unwrap();
    assert_eq!(row3.target_domain, "fallback.com");

    manager.shutdown().await;
}

/// 周期表格运行后重新布防，next_run投影更新
#[tokio::test]
async fn test_recurring_sheet_rearms() {
    let queue = Arc::new(MemoryJobQueue::default());
    let link_repo = Arc::new(MemoryLinkRepo::new());
    let sheet_repo = Arc::new(MemorySheetRepo::new());
    let notifier = Arc::new(BroadcastNotifier::new());
    let engine = Arc::new(ScriptedRenderEngine::new());

    engine.serve(
        "https://blog.example/a",
        200,
        r#"<a href="https://target.com/x">x</a>"#,
    );

    let client = Arc::new(MockSpreadsheetClient::new());
    client.set_column("A", vec!["https://blog.example/a"]);
    client.set_column("B", vec!["target.com"]);

    let sheet = make_sheet(CheckInterval::OneHour);
    let sheet_id = sheet.id;
    sheet_repo.insert(sheet);

    let scheduler = RecurringScheduler::new(
        sheet_repo.clone(),
        link_repo.clone(),
        Arc::new(FixedUserRepo::with(Priority::new(2))),
        queue.clone(),
        Arc::new(SheetAdapter::new(client)),
        notifier.clone(),
        fast_scheduler_config(),
    );

    let mut manager = WorkerManager::new(
        queue.clone(),
        link_repo.clone(),
        notifier.clone() as Arc<dyn Notifier>,
        fast_analyser(engine),
        LinkWorkerConfig {
            lease_timeout: Duration::from_secs(10),
            idle_sleep: Duration::from_millis(10),
        },
        Duration::from_secs(2),
    );
    manager.start_workers(1);

    scheduler.clone().run_sheet(sheet_id).await.unwrap();

    let sheet = sheet_repo.get(sheet_id).unwrap();
    assert_eq!(sheet.status, SheetStatus::Checked);
    assert!(sheet.next_run.is_some());

    // 定时器已重新布防
    let armed = scheduler.armed_tasks();
    assert_eq!(armed.len(), 1);
    assert_eq!(armed[0].0, sheet_id);

    scheduler.stop();
    assert!(scheduler.armed_tasks().is_empty());

    manager.shutdown().await;
}

/// 表格服务读失败：status=error，错误事件，不重新布防
#[tokio::test]
async fn test_failed_run_marks_error_and_does_not_rearm() {
    let queue = Arc::new(MemoryJobQueue::default());
    let link_repo = Arc::new(MemoryLinkRepo::new());
    let sheet_repo = Arc::new(MemorySheetRepo::new());
    let notifier = Arc::new(BroadcastNotifier::new());

    let sheet = make_sheet(CheckInterval::OneHour);
    let sheet_id = sheet.id;
    let project_id = sheet.project_id;
    sheet_repo.insert(sheet);

    let mut events = notifier.subscribe(project_id);

    let scheduler = RecurringScheduler::new(
        sheet_repo.clone(),
        link_repo.clone(),
        Arc::new(FixedUserRepo::with(Priority::new(2))),
        queue.clone(),
        Arc::new(SheetAdapter::new(Arc::new(MockSpreadsheetClient::failing()))),
        notifier.clone(),
        fast_scheduler_config(),
    );

    let result = scheduler.clone().run_sheet(sheet_id).await;
    assert!(matches!(result, Err(SchedulerError::Sheet(_))));

    let sheet = sheet_repo.get(sheet_id).unwrap();
    assert_eq!(sheet.status, SheetStatus::Error);
    assert!(scheduler.armed_tasks().is_empty());

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        if event.kind == NotifyEventKind::SheetsAnalysisError {
            saw_error = true;
        }
    }
    assert!(saw_error);
}

/// 冷启动：活跃表格布防，manual与inactive不布防
#[tokio::test]
async fn test_bootstrap_arms_only_schedulable_sheets() {
    let queue = Arc::new(MemoryJobQueue::default());
    let link_repo = Arc::new(MemoryLinkRepo::new());
    let sheet_repo = Arc::new(MemorySheetRepo::new());
    let notifier = Arc::new(BroadcastNotifier::new());

    let active = make_sheet(CheckInterval::OneDay);
    let active_id = active.id;
    sheet_repo.insert(active);

    sheet_repo.insert(make_sheet(CheckInterval::Manual));

    let mut inactive = make_sheet(CheckInterval::OneHour);
    inactive.status = SheetStatus::Inactive;
    sheet_repo.insert(inactive);

    let scheduler = RecurringScheduler::new(
        sheet_repo.clone(),
        link_repo,
        Arc::new(FixedUserRepo::with(Priority::new(3))),
        queue,
        Arc::new(SheetAdapter::new(Arc::new(MockSpreadsheetClient::new()))),
        notifier,
        fast_scheduler_config(),
    );

    let armed = scheduler.clone().bootstrap().await.unwrap();
    assert_eq!(armed, 1);

    let tasks = scheduler.armed_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].0, active_id);

    scheduler.stop();
}
