// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{Priority, UserPlan};
use crate::domain::repositories::link_repository::RepositoryError;
use crate::domain::repositories::user_repository::UserRepository;
use crate::infrastructure::database::entities::user as user_entity;
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// 用户仓库实现
///
/// 按用户套餐解析任务优先级；未知用户落到最低优先级
#[derive(Clone)]
pub struct UserRepoImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl UserRepoImpl {
    /// 创建新的用户仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for UserRepoImpl {
    async fn get_user_priority(&self, user_id: Uuid) -> Result<Priority, RepositoryError> {
        let model = user_entity::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?;

        let priority = model
            .and_then(|m| m.plan.parse::<UserPlan>().ok())
            .map(Priority::from)
            .unwrap_or(Priority::LOWEST);

        debug!("Resolved priority {} for user {}", priority, user_id);
        Ok(priority)
    }
}
