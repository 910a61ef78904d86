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

use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 表格校验错误
#[derive(Error, Debug)]
pub enum SheetValidationError {
    /// 结果区间列数必须恰好为5
    #[error("Result range must contain exactly 5 columns, got {0}")]
    InvalidResultRange(usize),
    /// 未知的检查间隔
    #[error("Unknown interval: {0}")]
    UnknownInterval(String),
}

/// 外部表格引用
///
/// 表格ID加工作表gid；工作表名称通过元数据查询按需解析
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetRef {
    /// 表格文档ID
    pub spreadsheet_id: String,
    /// 工作表gid
    pub sheet_gid: i64,
}

/// 结果回写区间
///
/// 固定5个连续列：状态、响应码、可索引、不可索引原因、链接发现标记
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRange {
    columns: Vec<String>,
}

impl ResultRange {
    /// 结果列数不变式
    pub const WIDTH: usize = 5;

    /// 创建结果区间，校验列数
    ///
    /// # 参数
    ///
    /// * `columns` - 列字母序列，必须恰好5个
    pub fn new(columns: Vec<String>) -> Result<Self, SheetValidationError> {
        if columns.len() != Self::WIDTH {
            return Err(SheetValidationError::InvalidResultRange(columns.len()));
        }
        Ok(Self { columns })
    }

    /// 从起始列推导5个连续列
    pub fn from_start(start: char) -> Result<Self, SheetValidationError> {
        let start = start.to_ascii_uppercase();
        if !start.is_ascii_uppercase() || start > 'V' {
            return Err(SheetValidationError::InvalidResultRange(0));
        }
        let columns = (0..Self::WIDTH as u8)
            .map(|i| ((start as u8 + i) as char).to_string())
            .collect();
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn start(&self) -> &str {
        &self.columns[0]
    }

    pub fn end(&self) -> &str {
        &self.columns[Self::WIDTH - 1]
    }

    /// A1表示法的区间片段，例如`H:L`
    pub fn a1_span(&self) -> String {
        format!("{}:{}", self.start(), self.end())
    }
}

impl Default for ResultRange {
    fn default() -> Self {
        Self {
            columns: ["H", "I", "J", "K", "L"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// 检查间隔枚举
///
/// 固定墙钟增量，`OneMonth`按日历月推进（末日截断），`Manual`不布防定时器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckInterval {
    /// 仅手动触发
    #[default]
    Manual,
    /// 每5分钟
    FiveMinutes,
    /// 每30分钟
    ThirtyMinutes,
    /// 每小时
    OneHour,
    /// 每4小时
    FourHours,
    /// 每8小时
    EightHours,
    /// 每12小时
    TwelveHours,
    /// 每天
    OneDay,
    /// 每3天
    ThreeDays,
    /// 每周
    OneWeek,
    /// 每月（日历月）
    OneMonth,
}

impl CheckInterval {
    /// 计算下次触发时间
    ///
    /// # 返回值
    ///
    /// * `Some(DateTime)` - 下次触发时刻
    /// * `None` - Manual间隔永不布防
    pub fn next_fire_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            CheckInterval::Manual => None,
            CheckInterval::FiveMinutes => Some(now + Duration::minutes(5)),
            CheckInterval::ThirtyMinutes => Some(now + Duration::minutes(30)),
            CheckInterval::OneHour => Some(now + Duration::hours(1)),
            CheckInterval::FourHours => Some(now + Duration::hours(4)),
            CheckInterval::EightHours => Some(now + Duration::hours(8)),
            CheckInterval::TwelveHours => Some(now + Duration::hours(12)),
            CheckInterval::OneDay => Some(now + Duration::days(1)),
            CheckInterval::ThreeDays => Some(now + Duration::days(3)),
            CheckInterval::OneWeek => Some(now + Duration::weeks(1)),
            CheckInterval::OneMonth => Some(add_calendar_month(now)),
        }
    }
}

/// 日历月推进，超出目标月天数时截断到末日
fn add_calendar_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let (mut year, mut month) = (now.year(), now.month());
    if month == 12 {
        year += 1;
        month = 1;
    } else {
        month += 1;
    }

    let last_day = days_in_month(year, month);
    let day = now.day().min(last_day);

    Utc.with_ymd_and_hms(
        year,
        month,
        day,
        now.time().hour(),
        now.time().minute(),
        now.time().second(),
    )
    .single()
    // 截断后的日期总是有效的
    .unwrap_or(now + Duration::days(30))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

use chrono::Timelike;

impl fmt::Display for CheckInterval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CheckInterval::Manual => "manual",
            CheckInterval::FiveMinutes => "5m",
            CheckInterval::ThirtyMinutes => "30m",
            CheckInterval::OneHour => "1h",
            CheckInterval::FourHours => "4h",
            CheckInterval::EightHours => "8h",
            CheckInterval::TwelveHours => "12h",
            CheckInterval::OneDay => "1d",
            CheckInterval::ThreeDays => "3d",
            CheckInterval::OneWeek => "1w",
            CheckInterval::OneMonth => "1M",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for CheckInterval {
    type Err = SheetValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(CheckInterval::Manual),
            "5m" => Ok(CheckInterval::FiveMinutes),
            "30m" => Ok(CheckInterval::ThirtyMinutes),
            "1h" => Ok(CheckInterval::OneHour),
            "4h" => Ok(CheckInterval::FourHours),
            "8h" => Ok(CheckInterval::EightHours),
            "12h" => Ok(CheckInterval::TwelveHours),
            "1d" => Ok(CheckInterval::OneDay),
            "3d" => Ok(CheckInterval::ThreeDays),
            "1w" => Ok(CheckInterval::OneWeek),
            "1M" => Ok(CheckInterval::OneMonth),
            _ => Err(SheetValidationError::UnknownInterval(s.to_string())),
        }
    }
}

/// 表格状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SheetStatus {
    /// 尚未运行
    #[default]
    NotStarted,
    /// 分析进行中
    Analysing,
    /// 最近一轮已完成
    Checked,
    /// 已停用
    Inactive,
    /// 最近一轮失败
    Error,
}

impl fmt::Display for SheetStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            SheetStatus::NotStarted => "not_started",
            SheetStatus::Analysing => "analysing",
            SheetStatus::Checked => "checked",
            SheetStatus::Inactive => "inactive",
            SheetStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SheetStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(SheetStatus::NotStarted),
            "analysing" => Ok(SheetStatus::Analysing),
            "checked" => Ok(SheetStatus::Checked),
            "inactive" => Ok(SheetStatus::Inactive),
            "error" => Ok(SheetStatus::Error),
            _ => Err(()),
        }
    }
}

/// 表格任务实体
///
/// 一个由外部表格驱动的周期性审核配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheet {
    /// 表格任务唯一标识符
    pub id: Uuid,
    /// 所属项目ID
    pub project_id: Uuid,
    /// 所属用户ID（优先级按其套餐解析）
    pub user_id: Uuid,
    /// 外部表格引用
    pub spreadsheet_ref: SpreadsheetRef,
    /// 默认目标域名
    pub target_domain: String,
    /// URL所在列
    pub url_column: String,
    /// 目标域名所在列
    pub target_column: String,
    /// 结果回写区间
    pub result_range: ResultRange,
    /// 检查间隔
    pub interval: CheckInterval,
    /// 表格状态
    pub status: SheetStatus,
    /// 上次运行时间
    pub last_run: Option<DateTime<FixedOffset>>,
    /// 下次运行时间（调度表的可观测投影）
    pub next_run: Option<DateTime<FixedOffset>>,
    /// 累计运行次数
    pub run_count: i32,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 更新时间
    pub updated_at: DateTime<FixedOffset>,
}

impl Sheet {
    /// 创建新的表格任务
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_id: Uuid,
        user_id: Uuid,
        spreadsheet_ref: SpreadsheetRef,
        target_domain: String,
        url_column: String,
        target_column: String,
        result_range: ResultRange,
        interval: CheckInterval,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            user_id,
            spreadsheet_ref,
            target_domain,
            url_column,
            target_column,
            result_range,
            interval,
            status: SheetStatus::NotStarted,
            last_run: None,
            next_run: None,
            run_count: 0,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    /// 表格是否应持有定时器
    pub fn is_schedulable(&self) -> bool {
        self.interval != CheckInterval::Manual
            && !matches!(self.status, SheetStatus::Inactive | SheetStatus::Error)
    }
}
