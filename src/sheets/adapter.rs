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

use chrono::{DateTime, FixedOffset};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::models::link::{Link, LinkClass, LinkState};
use crate::domain::models::sheet::Sheet;
use crate::sheets::client::{
    CellColor, FormatRequest, MajorDimension, SheetError, SpreadsheetClient,
};
use crate::utils::url_utils::normalise_target_domain;

/// 首个数据行（第1行是表头）
const FIRST_DATA_ROW: i32 = 2;

/// 表格一行输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    /// 表格行号（1基，表头为1）
    pub row_index: i32,
    /// 来源URL
    pub url: String,
    /// 该行的目标域名（规范化后；缺省回退到表格默认值）
    pub target: String,
    /// 用户原始输入的目标域名
    pub original_target: String,
}

/// 表格读取结果
#[derive(Debug, Clone)]
pub struct SheetReadResult {
    pub rows: Vec<SheetRow>,
    /// 结果区间是否已有旧数据
    pub has_existing_data: bool,
    /// 有效行总数
    pub total_rows: usize,
    /// 去重后的URL数
    pub unique_urls: usize,
}

/// 回写的一行结果
#[derive(Debug, Clone)]
pub struct RowOutcome {
    pub row_index: i32,
    pub ok: bool,
    pub response_code: Option<i32>,
    pub indexable: Option<bool>,
    pub non_indexable_reason: Option<String>,
    pub link_found: bool,
    pub canonicalised: bool,
    pub checked_at: Option<DateTime<FixedOffset>>,
}

impl RowOutcome {
    /// 由链接行构造回写结果
    ///
    /// 没有行号的链接（非表格来源）不参与回写
    pub fn from_link(link: &Link) -> Option<Self> {
        let row_index = link.row_index?;
        Some(Self {
            row_index,
            ok: link.state == LinkState::Ok,
            response_code: link.response_code,
            indexable: link.indexable,
            non_indexable_reason: link.non_indexable_reason.clone(),
            link_found: link
                .link_class
                .map(|c| c != LinkClass::Absent)
                .unwrap_or(false),
            canonicalised: link.non_indexable_reason.as_deref() == Some("canonicalised"),
            checked_at: link.checked_at,
        })
    }

    /// 五列输出：状态、响应码、可索引、原因、链接发现标记
    fn cells(&self) -> Vec<String> {
        let ts = self
            .checked_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        vec![
            if self.ok { "OK" } else { "Problem" }.to_string(),
            self.response_code.map(|c| c.to_string()).unwrap_or_default(),
            match self.indexable {
                Some(true) => "Yes".to_string(),
                Some(false) => "No".to_string(),
                None => String::new(),
            },
            self.non_indexable_reason.clone().unwrap_or_default(),
            if self.link_found {
                format!("True ({})", ts)
            } else {
                format!("False ({})", ts)
            },
        ]
    }

    fn color(&self) -> CellColor {
        if !self.ok {
            CellColor::Red
        } else if self.canonicalised {
            CellColor::Yellow
        } else {
            CellColor::Green
        }
    }
}

/// 表格适配器
///
/// 外部表格服务的双向薄桥：读输入列，回写五列结果，
/// 着色尽力而为
pub struct SheetAdapter {
    client: Arc<dyn SpreadsheetClient>,
}

impl SheetAdapter {
    pub fn new(client: Arc<dyn SpreadsheetClient>) -> Self {
        Self { client }
    }

    /// 按gid解析工作表名
    async fn resolve_title(&self, sheet: &Sheet) -> Result<String, SheetError> {
        let metadata = self
            .client
            .get_metadata(&sheet.spreadsheet_ref.spreadsheet_id)
            .await?;
        metadata
            .title_of(sheet.spreadsheet_ref.sheet_gid)
            .map(|t| t.to_string())
            .ok_or_else(|| {
                SheetError::WorksheetNotFound(format!(
                    "gid {} in {}",
                    sheet.spreadsheet_ref.sheet_gid, sheet.spreadsheet_ref.spreadsheet_id
                ))
            })
    }

    /// 读取输入列
    ///
    /// 表头行跳过；行内目标域名为空时回退到表格默认值；
    /// 目标域名在此统一规范化
    pub async fn read(&self, sheet: &Sheet) -> Result<SheetReadResult, SheetError> {
        let title = self.resolve_title(sheet).await?;
        let spreadsheet_id = &sheet.spreadsheet_ref.spreadsheet_id;

        let url_values = self
            .client
            .read_range(
                spreadsheet_id,
                &title,
                &format!("{}{}:{}", sheet.url_column, FIRST_DATA_ROW, sheet.url_column),
                MajorDimension::Columns,
            )
            .await?;
        let urls = url_values.into_iter().next().unwrap_or_default();

        let target_values = self
            .client
            .read_range(
                spreadsheet_id,
                &title,
                &format!(
                    "{}{}:{}",
                    sheet.target_column, FIRST_DATA_ROW, sheet.target_column
                ),
                MajorDimension::Columns,
            )
            .await?;
        let targets = target_values.into_iter().next().unwrap_or_default();

        let existing = self
            .client
            .read_range(
                spreadsheet_id,
                &title,
                &format!(
                    "{}{}:{}",
                    sheet.result_range.start(),
                    FIRST_DATA_ROW,
                    sheet.result_range.end()
                ),
                MajorDimension::Rows,
            )
            .await?;
        let has_existing_data = existing
            .iter()
            .any(|row| row.iter().any(|cell| !cell.trim().is_empty()));

        let default_target = normalise_target_domain(&sheet.target_domain)
            .unwrap_or_else(|| sheet.target_domain.clone());

        let mut rows = Vec::new();
        let mut unique = HashSet::new();
        for (i, url) in urls.iter().enumerate() {
            let url = url.trim();
            if url.is_empty() {
                continue;
            }

            let raw_target = targets
                .get(i)
                .map(|t| t.trim())
                .filter(|t| !t.is_empty());
            let original_target = raw_target
                .map(|t| t.to_string())
                .unwrap_or_else(|| sheet.target_domain.clone());
            let target = raw_target
                .and_then(normalise_target_domain)
                .unwrap_or_else(|| default_target.clone());

            unique.insert(url.to_string());
            rows.push(SheetRow {
                row_index: FIRST_DATA_ROW + i as i32,
                url: url.to_string(),
                target,
                original_target,
            });
        }

        debug!(
            "Read sheet {}: {} rows, {} unique urls",
            sheet.id,
            rows.len(),
            unique.len()
        );

        Ok(SheetReadResult {
            total_rows: rows.len(),
            unique_urls: unique.len(),
            has_existing_data,
            rows,
        })
    }

    /// 回写五列结果
    ///
    /// 调用方负责按行号聚合；无结果的行写空白
    pub async fn write_verdicts(
        &self,
        sheet: &Sheet,
        outcomes: &[RowOutcome],
    ) -> Result<(), SheetError> {
        if outcomes.is_empty() {
            return Ok(());
        }

        let title = self.resolve_title(sheet).await?;

        let max_row = outcomes
            .iter()
            .map(|o| o.row_index)
            .max()
            .unwrap_or(FIRST_DATA_ROW);
        let by_row: HashMap<i32, &RowOutcome> =
            outcomes.iter().map(|o| (o.row_index, o)).collect();

        let mut values = Vec::new();
        for row in FIRST_DATA_ROW..=max_row {
            match by_row.get(&row) {
                Some(outcome) => values.push(outcome.cells()),
                None => values.push(vec![String::new(); 5]),
            }
        }

        let range = format!(
            "{}{}:{}{}",
            sheet.result_range.start(),
            FIRST_DATA_ROW,
            sheet.result_range.end(),
            max_row
        );

        self.client
            .update_range(
                &sheet.spreadsheet_ref.spreadsheet_id,
                &title,
                &range,
                values,
            )
            .await
    }

    /// 结果着色
    ///
    /// 绿=ok，黄=ok但canonical化，红=problem，表头灰。
    /// 尽力而为：失败只记日志，不向上传播
    pub async fn format(&self, sheet: &Sheet, outcomes: &[RowOutcome]) {
        let col_start = column_index(sheet.result_range.start());
        let col_end = column_index(sheet.result_range.end()) + 1;
        let gid = sheet.spreadsheet_ref.sheet_gid;

        let mut requests = vec![FormatRequest {
            sheet_gid: gid,
            row_start: 0,
            row_end: 1,
            col_start,
            col_end,
            color: CellColor::Grey,
        }];

        for outcome in outcomes {
            requests.push(FormatRequest {
                sheet_gid: gid,
                row_start: (outcome.row_index - 1) as i64,
                row_end: outcome.row_index as i64,
                col_start,
                col_end,
                color: outcome.color(),
            });
        }

        if let Err(e) = self
            .client
            .batch_format(&sheet.spreadsheet_ref.spreadsheet_id, requests)
            .await
        {
            warn!("Sheet {} formatting failed (ignored): {}", sheet.id, e);
        }
    }
}

/// 列字母转0基索引
fn column_index(column: &str) -> i64 {
    column
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .fold(0i64, |acc, c| {
            acc * 26 + (c.to_ascii_uppercase() as i64 - 'A' as i64 + 1)
        })
        - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A"), 0);
        assert_eq!(column_index("H"), 7);
        assert_eq!(column_index("Z"), 25);
        assert_eq!(column_index("AA"), 26);
    }

    fn outcome(ok: bool, canonicalised: bool) -> RowOutcome {
        RowOutcome {
            row_index: 2,
            ok,
            response_code: Some(200),
            indexable: Some(true),
            non_indexable_reason: canonicalised.then(|| "canonicalised".to_string()),
            link_found: true,
            canonicalised,
            checked_at: Some(
                Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap().into(),
            ),
        }
    }

    #[test]
    fn test_cells_layout() {
        let cells = outcome(true, false).cells();
        assert_eq!(cells.len(), 5);
        assert_eq!(cells[0], "OK");
        assert_eq!(cells[1], "200");
        assert_eq!(cells[2], "Yes");
        assert_eq!(cells[3], "");
        assert_eq!(cells[4], "True (2024-05-01 10:00:00)");
    }

    #[test]
    fn test_problem_cells() {
        let mut o = outcome(false, false);
        o.indexable = Some(false);
        o.non_indexable_reason = Some("X-Robots-Tag: noindex".to_string());
        o.link_found = true;

        let cells = o.cells();
        assert_eq!(cells[0], "Problem");
        assert_eq!(cells[2], "No");
        assert_eq!(cells[3], "X-Robots-Tag: noindex");
    }

    #[test]
    fn test_colors() {
        assert_eq!(outcome(true, false).color(), CellColor::Green);
        assert_eq!(outcome(true, true).color(), CellColor::Yellow);
        assert_eq!(outcome(false, false).color(), CellColor::Red);
    }

    #[test]
    fn test_row_outcome_from_link_requires_row_index() {
        let link = Link::new(
            uuid::Uuid::new_v4(),
            "https://s/p".to_string(),
            "target.com".to_string(),
            "target.com".to_string(),
            crate::domain::models::link::LinkKind::Batch,
        );
        assert!(RowOutcome::from_link(&link).is_none());

        let sheet_link = link.with_sheet(uuid::Uuid::new_v4(), 4);
        let outcome = RowOutcome::from_link(&sheet_link).unwrap();
        assert_eq!(outcome.row_index, 4);
        assert!(!outcome.link_found);
    }
}
