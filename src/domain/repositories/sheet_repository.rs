// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::sheet::{Sheet, SheetStatus};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

use super::link_repository::RepositoryError;

/// 表格仓库特质
///
/// 管理表格任务配置；`next_run`范围扫描支撑调度器冷启动
#[async_trait]
pub trait SheetRepository: Send + Sync {
    /// 根据ID查找表格
    async fn get_sheet(&self, id: Uuid) -> Result<Option<Sheet>, RepositoryError>;
    /// 按ID整行更新表格
    async fn update_sheet(&self, sheet: &Sheet) -> Result<Sheet, RepositoryError>;
    /// 更新表格状态
    async fn update_status(&self, id: Uuid, status: SheetStatus) -> Result<(), RepositoryError>;
    /// 列出所有应持有定时器的表格，按`next_run`升序
    async fn list_active_sheets(&self) -> Result<Vec<Sheet>, RepositoryError>;
    /// 记录一轮运行完成：last_run/next_run/run_count
    async fn record_run(
        &self,
        id: Uuid,
        last_run: DateTime<FixedOffset>,
        next_run: Option<DateTime<FixedOffset>>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
impl<T: SheetRepository + ?Sized> SheetRepository for std::sync::Arc<T> {
    async fn get_sheet(&self, id: Uuid) -> Result<Option<Sheet>, RepositoryError> {
        (**self).get_sheet(id).await
    }

    async fn update_sheet(&self, sheet: &Sheet) -> Result<Sheet, RepositoryError> {
        (**self).update_sheet(sheet).await
    }

    async fn update_status(&self, id: Uuid, status: SheetStatus) -> Result<(), RepositoryError> {
        (**self).update_status(id, status).await
    }

    async fn list_active_sheets(&self) -> Result<Vec<Sheet>, RepositoryError> {
        (**self).list_active_sheets().await
    }

    async fn record_run(
        &self,
        id: Uuid,
        last_run: DateTime<FixedOffset>,
        next_run: Option<DateTime<FixedOffset>>,
    ) -> Result<(), RepositoryError> {
        (**self).record_run(id, last_run, next_run).await
    }
}
