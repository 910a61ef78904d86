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

use crate::domain::models::sheet::{ResultRange, Sheet, SheetStatus, SpreadsheetRef};
use crate::domain::repositories::link_repository::RepositoryError;
use crate::domain::repositories::sheet_repository::SheetRepository;
use crate::infrastructure::database::entities::sheet as sheet_entity;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 表格仓库实现
#[derive(Clone)]
pub struct SheetRepoImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl SheetRepoImpl {
    /// 创建新的表格仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<sheet_entity::Model> for Sheet {
    fn from(model: sheet_entity::Model) -> Self {
        let result_range = serde_json::from_value::<Vec<String>>(model.result_range)
            .ok()
            .and_then(|columns| ResultRange::new(columns).ok())
            .unwrap_or_default();

        Self {
            id: model.id,
            project_id: model.project_id,
            user_id: model.user_id,
            spreadsheet_ref: SpreadsheetRef {
                spreadsheet_id: model.spreadsheet_id,
                sheet_gid: model.sheet_gid,
            },
            target_domain: model.target_domain,
            url_column: model.url_column,
            target_column: model.target_column,
            result_range,
            interval: model.interval.parse().unwrap_or_default(),
            status: model.status.parse().unwrap_or_default(),
            last_run: model.last_run,
            next_run: model.next_run,
            run_count: model.run_count,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<Sheet> for sheet_entity::ActiveModel {
    fn from(sheet: Sheet) -> Self {
        Self {
            id: Set(sheet.id),
            project_id: Set(sheet.project_id),
            user_id: Set(sheet.user_id),
            spreadsheet_id: Set(sheet.spreadsheet_ref.spreadsheet_id),
            sheet_gid: Set(sheet.spreadsheet_ref.sheet_gid),
            target_domain: Set(sheet.target_domain),
            url_column: Set(sheet.url_column),
            target_column: Set(sheet.target_column),
            result_range: Set(serde_json::json!(sheet.result_range.columns())),
            interval: Set(sheet.interval.to_string()),
            status: Set(sheet.status.to_string()),
            last_run: Set(sheet.last_run),
            next_run: Set(sheet.next_run),
            run_count: Set(sheet.run_count),
            created_at: Set(sheet.created_at),
            updated_at: Set(sheet.updated_at),
        }
    }
}

#[async_trait]
impl SheetRepository for SheetRepoImpl {
    async fn get_sheet(&self, id: Uuid) -> Result<Option<Sheet>, RepositoryError> {
        let model = sheet_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }

    async fn update_sheet(&self, sheet: &Sheet) -> Result<Sheet, RepositoryError> {
        let model: sheet_entity::ActiveModel = sheet.clone().into();

        sheet_entity::Entity::insert(model)
            .on_conflict(
                OnConflict::column(sheet_entity::Column::Id)
                    .update_columns([
                        sheet_entity::Column::TargetDomain,
                        sheet_entity::Column::UrlColumn,
                        sheet_entity::Column::TargetColumn,
                        sheet_entity::Column::ResultRange,
                        sheet_entity::Column::Interval,
                        sheet_entity::Column::Status,
                        sheet_entity::Column::LastRun,
                        sheet_entity::Column::NextRun,
                        sheet_entity::Column::RunCount,
                        sheet_entity::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;

        Ok(sheet.clone())
    }

    async fn update_status(&self, id: Uuid, status: SheetStatus) -> Result<(), RepositoryError> {
        let now: DateTime<FixedOffset> = Utc::now().into();

        sheet_entity::Entity::update_many()
            .col_expr(sheet_entity::Column::Status, Expr::value(status.to_string()))
            .col_expr(sheet_entity::Column::UpdatedAt, Expr::value(now))
            .filter(sheet_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }

    async fn list_active_sheets(&self) -> Result<Vec<Sheet>, RepositoryError> {
        let models = sheet_entity::Entity::find()
            .filter(sheet_entity::Column::Interval.ne("manual"))
            .filter(sheet_entity::Column::Status.is_not_in(["inactive", "error"]))
            .order_by_asc(sheet_entity::Column::NextRun)
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn record_run(
        &self,
        id: Uuid,
        last_run: DateTime<FixedOffset>,
        next_run: Option<DateTime<FixedOffset>>,
    ) -> Result<(), RepositoryError> {
        let now: DateTime<FixedOffset> = Utc::now().into();

        sheet_entity::Entity::update_many()
            .col_expr(sheet_entity::Column::LastRun, Expr::value(last_run))
            .col_expr(sheet_entity::Column::NextRun, Expr::value(next_run))
            .col_expr(
                sheet_entity::Column::RunCount,
                Expr::col(sheet_entity::Column::RunCount).add(1),
            )
            .col_expr(sheet_entity::Column::UpdatedAt, Expr::value(now))
            .filter(sheet_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }
}
