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

use crate::domain::models::link::{Link, LinkKind, LinkState};
use crate::domain::repositories::link_repository::{LinkRepository, RepositoryError};
use crate::infrastructure::database::entities::link as link_entity;
use async_trait::async_trait;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 链接仓库实现
///
/// 基于SeaORM实现的链接数据访问层；upsert按主键冲突整行覆盖，
/// 对同一裁定的重复写入幂等
#[derive(Clone)]
pub struct LinkRepoImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl LinkRepoImpl {
    /// 创建新的链接仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<link_entity::Model> for Link {
    fn from(model: link_entity::Model) -> Self {
        Self {
            id: model.id,
            project_id: model.project_id,
            source_url: model.source_url,
            target_domain: model.target_domain,
            original_target_domain: model.original_target_domain,
            kind: model.kind.parse().unwrap_or_default(),
            state: model.state.parse().unwrap_or_default(),
            response_code: model.response_code,
            indexable: model.indexable,
            link_class: model.link_class.and_then(|c| c.parse().ok()),
            canonical_url: model.canonical_url,
            load_time_ms: model.load_time_ms,
            matched_anchor_html: model.matched_anchor_html,
            non_indexable_reason: model.non_indexable_reason,
            checked_at: model.checked_at,
            sheet_id: model.sheet_id,
            row_index: model.row_index,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<Link> for link_entity::ActiveModel {
    fn from(link: Link) -> Self {
        Self {
            id: Set(link.id),
            project_id: Set(link.project_id),
            source_url: Set(link.source_url),
            target_domain: Set(link.target_domain),
            original_target_domain: Set(link.original_target_domain),
            kind: Set(link.kind.to_string()),
            state: Set(link.state.to_string()),
            response_code: Set(link.response_code),
            indexable: Set(link.indexable),
            link_class: Set(link.link_class.map(|c| c.to_string())),
            canonical_url: Set(link.canonical_url),
            load_time_ms: Set(link.load_time_ms),
            matched_anchor_html: Set(link.matched_anchor_html),
            non_indexable_reason: Set(link.non_indexable_reason),
            checked_at: Set(link.checked_at),
            sheet_id: Set(link.sheet_id),
            row_index: Set(link.row_index),
            created_at: Set(link.created_at),
            updated_at: Set(link.updated_at),
        }
    }
}

#[async_trait]
impl LinkRepository for LinkRepoImpl {
    async fn get_link(&self, id: Uuid) -> Result<Option<Link>, RepositoryError> {
        let model = link_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }

    async fn upsert_link(&self, link: &Link) -> Result<Link, RepositoryError> {
        let model: link_entity::ActiveModel = link.clone().into();

        link_entity::Entity::insert(model)
            .on_conflict(
                OnConflict::column(link_entity::Column::Id)
                    .update_columns([
                        link_entity::Column::State,
                        link_entity::Column::ResponseCode,
                        link_entity::Column::Indexable,
                        link_entity::Column::LinkClass,
                        link_entity::Column::CanonicalUrl,
                        link_entity::Column::LoadTimeMs,
                        link_entity::Column::MatchedAnchorHtml,
                        link_entity::Column::NonIndexableReason,
                        link_entity::Column::CheckedAt,
                        link_entity::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;

        Ok(link.clone())
    }

    async fn reset_analysis(
        &self,
        project_id: Uuid,
        kind: LinkKind,
    ) -> Result<u64, RepositoryError> {
        let result = link_entity::Entity::delete_many()
            .filter(link_entity::Column::ProjectId.eq(project_id))
            .filter(link_entity::Column::Kind.eq(kind.to_string()))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    async fn list_by_project_and_kind(
        &self,
        project_id: Uuid,
        kind: LinkKind,
    ) -> Result<Vec<Link>, RepositoryError> {
        let models = link_entity::Entity::find()
            .filter(link_entity::Column::ProjectId.eq(project_id))
            .filter(link_entity::Column::Kind.eq(kind.to_string()))
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn count_in_states(
        &self,
        project_id: Uuid,
        kind: LinkKind,
        states: &[LinkState],
    ) -> Result<u64, RepositoryError> {
        let state_names: Vec<String> = states.iter().map(|s| s.to_string()).collect();

        let count = link_entity::Entity::find()
            .filter(link_entity::Column::ProjectId.eq(project_id))
            .filter(link_entity::Column::Kind.eq(kind.to_string()))
            .filter(link_entity::Column::State.is_in(state_names))
            .count(self.db.as_ref())
            .await?;

        Ok(count)
    }
}
