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

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "links")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    pub source_url: String,
    pub target_domain: String,
    pub original_target_domain: String,
    pub kind: String,
    pub state: String,
    pub response_code: Option<i32>,
    pub indexable: Option<bool>,
    pub link_class: Option<String>,
    pub canonical_url: Option<String>,
    pub load_time_ms: Option<i64>,
    pub matched_anchor_html: Option<String>,
    pub non_indexable_reason: Option<String>,
    pub checked_at: Option<ChronoDateTimeWithTimeZone>,
    pub sheet_id: Option<Uuid>,
    pub row_index: Option<i32>,
    pub created_at: ChronoDateTimeWithTimeZone,
    pub updated_at: ChronoDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
