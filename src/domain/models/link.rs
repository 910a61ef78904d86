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

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::verdict::Verdict;

/// 链接审核实体
///
/// 表示一条待审核的出站链接：来源页面与目标域名的配对，
/// 以及分析产出的裁定字段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    /// 链接唯一标识符
    pub id: Uuid,
    /// 所属项目ID
    pub project_id: Uuid,
    /// 来源页面URL
    pub source_url: String,
    /// 规范化后的目标域名
    pub target_domain: String,
    /// 用户原始输入的目标域名
    pub original_target_domain: String,
    /// 链接来源类型
    pub kind: LinkKind,
    /// 链接状态
    pub state: LinkState,
    /// 主文档响应状态码
    pub response_code: Option<i32>,
    /// 页面是否可被索引
    pub indexable: Option<bool>,
    /// 链接分类
    pub link_class: Option<LinkClass>,
    /// canonical指向的URL
    pub canonical_url: Option<String>,
    /// 分析耗时（毫秒）
    pub load_time_ms: Option<i64>,
    /// 命中锚元素的outerHTML
    pub matched_anchor_html: Option<String>,
    /// 不可索引原因
    pub non_indexable_reason: Option<String>,
    /// 分析完成时间
    pub checked_at: Option<DateTime<FixedOffset>>,
    /// 所属表格ID（仅sheet类型）
    pub sheet_id: Option<Uuid>,
    /// 表格行号（仅sheet类型，用于回写排序）
    pub row_index: Option<i32>,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 更新时间
    pub updated_at: DateTime<FixedOffset>,
}

/// 链接来源类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// 批量API提交
    #[default]
    Batch,
    /// 表格调度器产生
    Sheet,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkKind::Batch => write!(f, "batch"),
            LinkKind::Sheet => write!(f, "sheet"),
        }
    }
}

impl FromStr for LinkKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch" => Ok(LinkKind::Batch),
            "sheet" => Ok(LinkKind::Sheet),
            _ => Err(()),
        }
    }
}

/// 链接状态枚举
///
/// `Ok`与`Problem`为终态，一次分析恰好到达一次；
/// 回到非终态只能通过显式重置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// 等待分析
    #[default]
    Pending,
    /// 分析中
    Running,
    /// 分析完成且链接健康
    Ok,
    /// 链接缺失或页面不可索引
    Problem,
}

impl LinkState {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, LinkState::Ok | LinkState::Problem)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkState::Pending => write!(f, "pending"),
            LinkState::Running => write!(f, "running"),
            LinkState::Ok => write!(f, "ok"),
            LinkState::Problem => write!(f, "problem"),
        }
    }
}

impl FromStr for LinkState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LinkState::Pending),
            "running" => Ok(LinkState::Running),
            "ok" => Ok(LinkState::Ok),
            "problem" => Ok(LinkState::Problem),
            _ => Err(()),
        }
    }
}

/// 链接分类枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkClass {
    /// 传递权重的正常链接
    Dofollow,
    /// rel含nofollow
    Nofollow,
    /// rel含sponsored
    Sponsored,
    /// rel含ugc
    Ugc,
    /// 页面上未找到指向目标域名的链接
    Absent,
}

impl fmt::Display for LinkClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkClass::Dofollow => write!(f, "dofollow"),
            LinkClass::Nofollow => write!(f, "nofollow"),
            LinkClass::Sponsored => write!(f, "sponsored"),
            LinkClass::Ugc => write!(f, "ugc"),
            LinkClass::Absent => write!(f, "absent"),
        }
    }
}

impl FromStr for LinkClass {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dofollow" => Ok(LinkClass::Dofollow),
            "nofollow" => Ok(LinkClass::Nofollow),
            "sponsored" => Ok(LinkClass::Sponsored),
            "ugc" => Ok(LinkClass::Ugc),
            "absent" => Ok(LinkClass::Absent),
            _ => Err(()),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换
    #[error("Invalid state transition")]
    InvalidStateTransition,
}

impl Link {
    /// 创建一条新的待分析链接
    ///
    /// # 参数
    ///
    /// * `project_id` - 所属项目ID
    /// * `source_url` - 来源页面URL
    /// * `target_domain` - 规范化后的目标域名
    /// * `original_target_domain` - 用户原始输入
    /// * `kind` - 链接来源类型
    ///
    /// # 返回值
    ///
    /// 返回处于`Pending`状态、裁定字段全空的链接
    pub fn new(
        project_id: Uuid,
        source_url: String,
        target_domain: String,
        original_target_domain: String,
        kind: LinkKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            source_url,
            target_domain,
            original_target_domain,
            kind,
            state: LinkState::Pending,
            response_code: None,
            indexable: None,
            link_class: None,
            canonical_url: None,
            load_time_ms: None,
            matched_anchor_html: None,
            non_indexable_reason: None,
            checked_at: None,
            sheet_id: None,
            row_index: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    /// 绑定表格来源信息
    pub fn with_sheet(mut self, sheet_id: Uuid, row_index: i32) -> Self {
        self.kind = LinkKind::Sheet;
        self.sheet_id = Some(sheet_id);
        self.row_index = Some(row_index);
        self
    }

    /// 启动分析
    ///
    /// 将状态从Pending变更为Running
    pub fn start(mut self) -> Result<Self, DomainError> {
        match self.state {
            LinkState::Pending => {
                self.state = LinkState::Running;
                self.updated_at = Utc::now().into();
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 记录分析裁定
    ///
    /// 将状态从Running变更为终态，并写入全部裁定字段。
    /// 终态每轮分析只到达一次
    ///
    /// # 参数
    ///
    /// * `verdict` - 分析器产出的裁定
    pub fn record_verdict(mut self, verdict: &Verdict) -> Result<Self, DomainError> {
        match self.state {
            LinkState::Running => {
                self.state = verdict.status.into();
                self.response_code = Some(verdict.response_code);
                self.indexable = Some(verdict.indexable);
                self.link_class = Some(verdict.link_class);
                self.canonical_url = verdict.canonical_url.clone();
                self.load_time_ms = Some(verdict.load_time_ms);
                self.matched_anchor_html = verdict.matched_anchor_html.clone();
                self.non_indexable_reason = verdict.non_indexable_reason.clone();
                self.checked_at = Some(verdict.checked_at.into());
                self.updated_at = Utc::now().into();
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 显式重置
    ///
    /// 回到Pending并清空全部裁定字段，开启新一轮分析纪元
    pub fn reset(mut self) -> Self {
        self.state = LinkState::Pending;
        self.response_code = None;
        self.indexable = None;
        self.link_class = None;
        self.canonical_url = None;
        self.load_time_ms = None;
        self.matched_anchor_html = None;
        self.non_indexable_reason = None;
        self.checked_at = None;
        self.updated_at = Utc::now().into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::verdict::{LinkStatus, Verdict};

    fn sample_link() -> Link {
        Link::new(
            Uuid::new_v4(),
            "https://source.example/page".to_string(),
            "target.com".to_string(),
            "www.Target.com".to_string(),
            LinkKind::Batch,
        )
    }

    fn sample_verdict() -> Verdict {
        Verdict {
            status: LinkStatus::Ok,
            response_code: 200,
            indexable: true,
            link_class: LinkClass::Dofollow,
            canonical_url: None,
            load_time_ms: 1234,
            matched_anchor_html: Some("<a href=\"https://target.com/x\">x</a>".to_string()),
            non_indexable_reason: None,
            checked_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_link_is_pending_with_empty_verdict() {
        let link = sample_link();
        assert_eq!(link.state, LinkState::Pending);
        assert!(link.response_code.is_none());
        assert!(link.link_class.is_none());
        assert!(link.checked_at.is_none());
    }

    #[test]
    fn test_state_transitions() {
        let link = sample_link();
        let running = link.start().unwrap();
        assert_eq!(running.state, LinkState::Running);

        let done = running.record_verdict(&sample_verdict()).unwrap();
        assert_eq!(done.state, LinkState::Ok);
        assert_eq!(done.response_code, Some(200));
    }

    #[test]
    fn test_terminal_reached_once() {
        let link = sample_link().start().unwrap();
        let done = link.record_verdict(&sample_verdict()).unwrap();
        // 终态不能再次记录裁定
        assert!(done.record_verdict(&sample_verdict()).is_err());
    }

    #[test]
    fn test_cannot_start_from_terminal() {
        let done = sample_link()
            .start()
            .unwrap()
            .record_verdict(&sample_verdict())
            .unwrap();
        assert!(done.start().is_err());
    }

    #[test]
    fn test_reset_clears_verdict_fields() {
        let done = sample_link()
            .start()
            .unwrap()
            .record_verdict(&sample_verdict())
            .unwrap();

        let reset = done.reset();
        assert_eq!(reset.state, LinkState::Pending);
        assert!(reset.response_code.is_none());
        assert!(reset.indexable.is_none());
        assert!(reset.link_class.is_none());
        assert!(reset.load_time_ms.is_none());
        assert!(reset.checked_at.is_none());
    }
}
