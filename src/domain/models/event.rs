// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 通知事件类型
///
/// 封闭集合：批量分析与表格分析各有一组对称的生命周期事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyEventKind {
    LinkUpdated,
    AnalysisStarted,
    AnalysisProgress,
    AnalysisCompleted,
    AnalysisError,
    SheetsLinkUpdated,
    SheetsAnalysisStarted,
    SheetsAnalysisProgress,
    SheetsAnalysisCompleted,
    SheetsAnalysisError,
}

impl fmt::Display for NotifyEventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            NotifyEventKind::LinkUpdated => "link_updated",
            NotifyEventKind::AnalysisStarted => "analysis_started",
            NotifyEventKind::AnalysisProgress => "analysis_progress",
            NotifyEventKind::AnalysisCompleted => "analysis_completed",
            NotifyEventKind::AnalysisError => "analysis_error",
            NotifyEventKind::SheetsLinkUpdated => "sheets_link_updated",
            NotifyEventKind::SheetsAnalysisStarted => "sheets_analysis_started",
            NotifyEventKind::SheetsAnalysisProgress => "sheets_analysis_progress",
            NotifyEventKind::SheetsAnalysisCompleted => "sheets_analysis_completed",
            NotifyEventKind::SheetsAnalysisError => "sheets_analysis_error",
        };
        write!(f, "{}", s)
    }
}

impl NotifyEventKind {
    /// 按链接来源选择对应的事件族
    pub fn for_sheet(self) -> NotifyEventKind {
        match self {
            NotifyEventKind::LinkUpdated => NotifyEventKind::SheetsLinkUpdated,
            NotifyEventKind::AnalysisStarted => NotifyEventKind::SheetsAnalysisStarted,
            NotifyEventKind::AnalysisProgress => NotifyEventKind::SheetsAnalysisProgress,
            NotifyEventKind::AnalysisCompleted => NotifyEventKind::SheetsAnalysisCompleted,
            NotifyEventKind::AnalysisError => NotifyEventKind::SheetsAnalysisError,
            other => other,
        }
    }
}

/// 通知事件
///
/// 发布到`project:{id}`主题的事件信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyEvent {
    /// 所属项目ID
    pub project_id: Uuid,
    /// 事件类型
    pub kind: NotifyEventKind,
    /// 事件载荷
    pub payload: serde_json::Value,
    /// 发布时间
    pub published_at: DateTime<Utc>,
}

impl NotifyEvent {
    pub fn new(project_id: Uuid, kind: NotifyEventKind, payload: serde_json::Value) -> Self {
        Self {
            project_id,
            kind,
            payload,
            published_at: Utc::now(),
        }
    }

    /// 发布主题名
    pub fn topic(&self) -> String {
        format!("project:{}", self.project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(NotifyEventKind::LinkUpdated.to_string(), "link_updated");
        assert_eq!(
            NotifyEventKind::SheetsAnalysisCompleted.to_string(),
            "sheets_analysis_completed"
        );
    }

    #[test]
    fn test_for_sheet_mapping() {
        assert_eq!(
            NotifyEventKind::AnalysisCompleted.for_sheet(),
            NotifyEventKind::SheetsAnalysisCompleted
        );
        assert_eq!(
            NotifyEventKind::SheetsLinkUpdated.for_sheet(),
            NotifyEventKind::SheetsLinkUpdated
        );
    }

    #[test]
    fn test_topic_format() {
        let project_id = Uuid::nil();
        let event = NotifyEvent::new(
            project_id,
            NotifyEventKind::AnalysisStarted,
            serde_json::json!({}),
        );
        assert_eq!(event.topic(), format!("project:{}", project_id));
    }
}
