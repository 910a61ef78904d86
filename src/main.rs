// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use backlinkrs::config::settings::Settings;
use backlinkrs::domain::services::link_analyser::LinkAnalyser;
use backlinkrs::engines::browser_engine::ChromiumRenderEngine;
use backlinkrs::engines::proxy_engine::HttpRenderingProxy;
use backlinkrs::infrastructure::database::connection;
use backlinkrs::infrastructure::repositories::link_repo_impl::LinkRepoImpl;
use backlinkrs::infrastructure::repositories::sheet_repo_impl::SheetRepoImpl;
use backlinkrs::infrastructure::repositories::user_repo_impl::UserRepoImpl;
use backlinkrs::infrastructure::services::broadcast_notifier::BroadcastNotifier;
use backlinkrs::queue::memory_queue::MemoryJobQueue;
use backlinkrs::queue::scheduler::QueueMaintenance;
use backlinkrs::sheets::adapter::SheetAdapter;
use backlinkrs::sheets::client::HttpSpreadsheetClient;
use backlinkrs::sheets::scheduler::RecurringScheduler;
use backlinkrs::utils::telemetry;
use backlinkrs::workers::manager::WorkerManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 主函数
///
/// 应用程序入口点：装配执行平面的全部组件并启动
///
/// # 功能
///
/// 1. 初始化日志系统
/// 2. 加载应用程序配置
/// 3. 建立数据库连接
/// 4. 创建仓库、队列、引擎与通知器
/// 5. 冷启动周期调度器
/// 6. 启动工作器池与队列维护
/// 7. 等待关闭信号并优雅停机
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 初始化日志系统
    telemetry::init_telemetry();
    info!("Starting backlinkrs...");

    // 2. 加载应用程序配置
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    // 3. 建立数据库连接
    let db = Arc::new(connection::create_pool(&settings.database).await?);
    info!("Database connection established");

    // 4. 装配核心组件
    let link_repo = Arc::new(LinkRepoImpl::new(db.clone()));
    let sheet_repo = Arc::new(SheetRepoImpl::new(db.clone()));
    let user_repo = Arc::new(UserRepoImpl::new(db.clone()));

    let queue = Arc::new(MemoryJobQueue::new(settings.queue_config()));
    let notifier = Arc::new(BroadcastNotifier::new());

    if !settings.proxy.enabled() {
        info!("Rendering proxy disabled (no API token configured)");
    }
    let proxy = Arc::new(HttpRenderingProxy::new(
        settings.proxy.endpoint.clone(),
        settings.proxy.api_token.clone(),
    ));
    let analyser = Arc::new(LinkAnalyser::new(
        Arc::new(ChromiumRenderEngine),
        proxy,
        settings.analyser_config(),
    ));

    // 5. 冷启动周期调度器
    let sheet_client = Arc::new(HttpSpreadsheetClient::new(
        settings.sheets.endpoint.clone(),
        settings.sheets.api_token.clone(),
    ));
    let adapter = Arc::new(SheetAdapter::new(sheet_client));
    let scheduler = RecurringScheduler::new(
        sheet_repo.clone(),
        link_repo.clone(),
        user_repo.clone(),
        queue.clone(),
        adapter,
        notifier.clone(),
        settings.scheduler_config(),
    );
    let armed = scheduler.clone().bootstrap().await?;
    info!("Recurring scheduler armed {} sheet timers", armed);

    // 6. 队列维护与工作器池
    let maintenance = QueueMaintenance::new(
        queue.clone(),
        Duration::from_millis(settings.queue.maintenance_interval_ms),
    );
    maintenance.recover().await;
    let maintenance_handle = maintenance.start();

    let mut manager = WorkerManager::new(
        queue,
        link_repo,
        notifier,
        analyser,
        settings.worker_config(),
        Duration::from_millis(settings.workers.drain_grace_ms),
    );
    manager.start_workers(settings.workers.concurrency);

    // 7. 等待关闭信号
    manager.wait_for_shutdown().await;

    scheduler.stop();
    maintenance_handle.abort();
    info!("backlinkrs stopped");

    Ok(())
}
