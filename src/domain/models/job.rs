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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::models::link::LinkKind;

/// 任务ID命名空间
///
/// job_id由(kind, source_url, project_id)确定性派生，
/// 同一入队纪元内的重复提交会折叠为同一个ID
const JOB_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0x1c, 0x2a, 0x90, 0x4f, 0x3d, 0x5e, 0x81, 0x9a, 0x07, 0xc4, 0xd8, 0x33, 0x52, 0x6f, 0xee,
]);

/// 用户套餐枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserPlan {
    Enterprise,
    Pro,
    Starter,
    #[default]
    Free,
}

impl fmt::Display for UserPlan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            UserPlan::Enterprise => "enterprise",
            UserPlan::Pro => "pro",
            UserPlan::Starter => "starter",
            UserPlan::Free => "free",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for UserPlan {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enterprise" => Ok(UserPlan::Enterprise),
            "pro" => Ok(UserPlan::Pro),
            "starter" => Ok(UserPlan::Starter),
            "free" => Ok(UserPlan::Free),
            _ => Err(()),
        }
    }
}

/// 任务优先级
///
/// 数值越小越优先：enterprise=1, pro=2, starter=3, free=4
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Priority = Priority(1);
    pub const LOWEST: Priority = Priority(4);

    /// 创建优先级，越界值截断到[1,4]
    pub fn new(value: u8) -> Self {
        Priority(value.clamp(1, 4))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl From<UserPlan> for Priority {
    fn from(plan: UserPlan) -> Self {
        match plan {
            UserPlan::Enterprise => Priority(1),
            UserPlan::Pro => Priority(2),
            UserPlan::Starter => Priority(3),
            UserPlan::Free => Priority(4),
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::LOWEST
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 任务载荷
///
/// 封闭的带标签变体，按来源区分批量任务与表格任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// 批量API提交的任务
    Batch {
        /// 对应的链接行ID
        link_id: Uuid,
    },
    /// 表格调度器产生的任务
    Sheet {
        /// 对应的链接行ID
        link_id: Uuid,
        /// 所属表格ID
        sheet_id: Uuid,
        /// 表格行号
        row_index: i32,
    },
}

impl JobPayload {
    pub fn link_id(&self) -> Uuid {
        match self {
            JobPayload::Batch { link_id } => *link_id,
            JobPayload::Sheet { link_id, .. } => *link_id,
        }
    }

    pub fn kind(&self) -> LinkKind {
        match self {
            JobPayload::Batch { .. } => LinkKind::Batch,
            JobPayload::Sheet { .. } => LinkKind::Sheet,
        }
    }

    pub fn sheet_id(&self) -> Option<Uuid> {
        match self {
            JobPayload::Batch { .. } => None,
            JobPayload::Sheet { sheet_id, .. } => Some(*sheet_id),
        }
    }
}

/// 分析任务
///
/// 队列中流转的工作单元，公共信封加封闭载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// 确定性任务ID
    pub job_id: Uuid,
    /// 载荷（按来源区分）
    pub payload: JobPayload,
    /// 提交用户ID
    pub user_id: Uuid,
    /// 所属项目ID
    pub project_id: Uuid,
    /// 来源页面URL
    pub source_url: String,
    /// 规范化后的目标域名
    pub target_domain: String,
    /// 优先级
    pub priority: Priority,
    /// 已尝试次数
    pub attempts: u32,
    /// 入队时间
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    /// 由(kind, source_url, project_id)确定性派生任务ID
    pub fn derive_id(kind: LinkKind, source_url: &str, project_id: Uuid) -> Uuid {
        let material = format!("{}:{}:{}", kind, project_id, source_url);
        Uuid::new_v5(&JOB_ID_NAMESPACE, material.as_bytes())
    }

    /// 创建批量任务
    pub fn new_batch(
        user_id: Uuid,
        project_id: Uuid,
        link_id: Uuid,
        source_url: String,
        target_domain: String,
        priority: Priority,
    ) -> Self {
        Self {
            job_id: Self::derive_id(LinkKind::Batch, &source_url, project_id),
            payload: JobPayload::Batch { link_id },
            user_id,
            project_id,
            source_url,
            target_domain,
            priority,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// 创建表格任务
    #[allow(clippy::too_many_arguments)]
    pub fn new_sheet(
        user_id: Uuid,
        project_id: Uuid,
        link_id: Uuid,
        sheet_id: Uuid,
        row_index: i32,
        source_url: String,
        target_domain: String,
        priority: Priority,
    ) -> Self {
        Self {
            job_id: Self::derive_id(LinkKind::Sheet, &source_url, project_id),
            payload: JobPayload::Sheet {
                link_id,
                sheet_id,
                row_index,
            },
            user_id,
            project_id,
            source_url,
            target_domain,
            priority,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> LinkKind {
        self.payload.kind()
    }
}
