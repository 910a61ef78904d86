// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::models::link::{LinkClass, LinkState};

/// 最终裁定状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// 链接存在且页面可索引（或仅canonical化）
    Ok,
    /// 链接缺失或页面被noindex
    Problem,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkStatus::Ok => write!(f, "ok"),
            LinkStatus::Problem => write!(f, "problem"),
        }
    }
}

impl From<LinkStatus> for LinkState {
    fn from(status: LinkStatus) -> Self {
        match status {
            LinkStatus::Ok => LinkState::Ok,
            LinkStatus::Problem => LinkState::Problem,
        }
    }
}

/// 分析裁定
///
/// 分析器对单个任务的结构化产出，字段与`Link`的裁定列一一对应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub status: LinkStatus,
    /// 主文档响应码，回退兜底成功时为0
    pub response_code: i32,
    pub indexable: bool,
    pub link_class: LinkClass,
    pub canonical_url: Option<String>,
    /// 端到端墙钟耗时
    pub load_time_ms: i64,
    pub matched_anchor_html: Option<String>,
    pub non_indexable_reason: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl Verdict {
    /// 构造`link_updated`事件的线上载荷
    pub fn wire_payload(&self, project_id: Uuid, link_id: Uuid) -> LinkUpdatedPayload {
        LinkUpdatedPayload {
            project_id,
            link_id,
            status: self.status,
            response_code: self.response_code,
            indexable: self.indexable,
            link_class: self.link_class,
            canonical_url: self.canonical_url.clone(),
            load_time: self.load_time_ms,
            matched_anchor_html: self.matched_anchor_html.clone(),
            non_indexable_reason: self.non_indexable_reason.clone(),
            checked_at: self.checked_at,
        }
    }
}

/// `link_updated`事件载荷（线上格式，camelCase）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkUpdatedPayload {
    pub project_id: Uuid,
    pub link_id: Uuid,
    pub status: LinkStatus,
    pub response_code: i32,
    pub indexable: bool,
    pub link_class: LinkClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    pub load_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_anchor_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub non_indexable_reason: Option<String>,
    pub checked_at: DateTime<Utc>,
}
