// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::Priority;
use async_trait::async_trait;
use uuid::Uuid;

use super::link_repository::RepositoryError;

/// 用户仓库特质
///
/// 核心只消费优先级查询：按用户套餐映射到1..4
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 解析用户的任务优先级
    ///
    /// 未知用户落到最低优先级而不是报错
    async fn get_user_priority(&self, user_id: Uuid) -> Result<Priority, RepositoryError>;
}

#[async_trait]
impl<T: UserRepository + ?Sized> UserRepository for std::sync::Arc<T> {
    async fn get_user_priority(&self, user_id: Uuid) -> Result<Priority, RepositoryError> {
        (**self).get_user_priority(user_id).await
    }
}
