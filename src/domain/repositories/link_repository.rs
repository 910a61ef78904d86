// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::link::{Link, LinkKind, LinkState};
use async_trait::async_trait;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
}

/// 链接仓库特质
///
/// 定义链接行数据访问接口，所有变更按ID幂等
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// 根据ID查找链接
    async fn get_link(&self, id: Uuid) -> Result<Option<Link>, RepositoryError>;
    /// 插入或按ID整行更新链接
    async fn upsert_link(&self, link: &Link) -> Result<Link, RepositoryError>;
    /// 重置分析纪元：删除项目内指定来源类型的全部链接行
    ///
    /// 表格每轮运行以表格内容为准，旧行不保留
    async fn reset_analysis(
        &self,
        project_id: Uuid,
        kind: LinkKind,
    ) -> Result<u64, RepositoryError>;
    /// 按项目与来源类型列出链接
    async fn list_by_project_and_kind(
        &self,
        project_id: Uuid,
        kind: LinkKind,
    ) -> Result<Vec<Link>, RepositoryError>;
    /// 统计项目内处于指定状态的链接数
    async fn count_in_states(
        &self,
        project_id: Uuid,
        kind: LinkKind,
        states: &[LinkState],
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
impl<T: LinkRepository + ?Sized> LinkRepository for std::sync::Arc<T> {
    async fn get_link(&self, id: Uuid) -> Result<Option<Link>, RepositoryError> {
        (**self).get_link(id).await
    }

    async fn upsert_link(&self, link: &Link) -> Result<Link, RepositoryError> {
        (**self).upsert_link(link).await
    }

    async fn reset_analysis(
        &self,
        project_id: Uuid,
        kind: LinkKind,
    ) -> Result<u64, RepositoryError> {
        (**self).reset_analysis(project_id, kind).await
    }

    async fn list_by_project_and_kind(
        &self,
        project_id: Uuid,
        kind: LinkKind,
    ) -> Result<Vec<Link>, RepositoryError> {
        (**self).list_by_project_and_kind(project_id, kind).await
    }

    async fn count_in_states(
        &self,
        project_id: Uuid,
        kind: LinkKind,
        states: &[LinkState],
    ) -> Result<u64, RepositoryError> {
        (**self).count_in_states(project_id, kind, states).await
    }
}
