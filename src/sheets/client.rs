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

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// 表格服务错误类型
#[derive(Error, Debug)]
pub enum SheetError {
    /// HTTP错误
    #[error("Spreadsheet request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// 服务端返回错误
    #[error("Spreadsheet API error: {0}")]
    Api(String),
    /// 工作表不存在
    #[error("Worksheet not found: {0}")]
    WorksheetNotFound(String),
    /// 服务未配置
    #[error("Spreadsheet service not configured")]
    NotConfigured,
}

/// 工作表元信息
#[derive(Debug, Clone)]
pub struct WorksheetInfo {
    pub gid: i64,
    pub title: String,
}

/// 表格元信息
#[derive(Debug, Clone)]
pub struct SpreadsheetMetadata {
    pub worksheets: Vec<WorksheetInfo>,
}

impl SpreadsheetMetadata {
    /// 按gid解析工作表名
    pub fn title_of(&self, gid: i64) -> Option<&str> {
        self.worksheets
            .iter()
            .find(|w| w.gid == gid)
            .map(|w| w.title.as_str())
    }
}

/// 读取主维度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MajorDimension {
    Rows,
    Columns,
}

impl MajorDimension {
    fn as_str(&self) -> &'static str {
        match self {
            MajorDimension::Rows => "ROWS",
            MajorDimension::Columns => "COLUMNS",
        }
    }
}

/// 单元格底色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellColor {
    /// ok
    Green,
    /// ok但canonical化
    Yellow,
    /// problem
    Red,
    /// 表头
    Grey,
}

impl CellColor {
    /// RGB分量（0.0-1.0）
    pub fn rgb(&self) -> (f64, f64, f64) {
        match self {
            CellColor::Green => (0.8, 0.94, 0.8),
            CellColor::Yellow => (1.0, 0.95, 0.7),
            CellColor::Red => (0.96, 0.78, 0.76),
            CellColor::Grey => (0.85, 0.85, 0.85),
        }
    }
}

/// 区间着色请求
#[derive(Debug, Clone)]
pub struct FormatRequest {
    pub sheet_gid: i64,
    /// 起始行（0基，含）
    pub row_start: i64,
    /// 结束行（0基，不含）
    pub row_end: i64,
    /// 起始列（0基，含）
    pub col_start: i64,
    /// 结束列（0基，不含）
    pub col_end: i64,
    pub color: CellColor,
}

/// 表格服务特质
///
/// 外部表格服务的能力面：元数据、区间读写与批量着色
#[async_trait]
pub trait SpreadsheetClient: Send + Sync {
    /// 读取表格元信息
    async fn get_metadata(&self, spreadsheet_id: &str) -> Result<SpreadsheetMetadata, SheetError>;

    /// 读取区间
    async fn read_range(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        range: &str,
        major_dim: MajorDimension,
    ) -> Result<Vec<Vec<String>>, SheetError>;

    /// 写入区间
    async fn update_range(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<(), SheetError>;

    /// 批量着色
    async fn batch_format(
        &self,
        spreadsheet_id: &str,
        requests: Vec<FormatRequest>,
    ) -> Result<(), SheetError>;
}

/// Google Sheets风格的HTTP实现
pub struct HttpSpreadsheetClient {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

#[derive(Deserialize)]
struct WireMetadata {
    sheets: Vec<WireSheet>,
}

#[derive(Deserialize)]
struct WireSheet {
    properties: WireSheetProperties,
}

#[derive(Deserialize)]
struct WireSheetProperties {
    #[serde(rename = "sheetId")]
    sheet_id: i64,
    title: String,
}

#[derive(Deserialize)]
struct WireValues {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

impl HttpSpreadsheetClient {
    /// 创建表格服务客户端
    pub fn new(endpoint: String, api_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_token,
        }
    }

    fn token(&self) -> Result<&str, SheetError> {
        self.api_token.as_deref().ok_or(SheetError::NotConfigured)
    }
}

#[async_trait]
impl SpreadsheetClient for HttpSpreadsheetClient {
    async fn get_metadata(&self, spreadsheet_id: &str) -> Result<SpreadsheetMetadata, SheetError> {
        let token = self.token()?;
        let url = format!("{}/spreadsheets/{}", self.endpoint, spreadsheet_id);

        let resp = self.client.get(&url).bearer_auth(token).send().await?;
        if !resp.status().is_success() {
            return Err(SheetError::Api(format!(
                "metadata request returned {}",
                resp.status()
            )));
        }

        let wire: WireMetadata = resp.json().await?;
        Ok(SpreadsheetMetadata {
            worksheets: wire
                .sheets
                .into_iter()
                .map(|s| WorksheetInfo {
                    gid: s.properties.sheet_id,
                    title: s.properties.title,
                })
                .collect(),
        })
    }

    async fn read_range(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        range: &str,
        major_dim: MajorDimension,
    ) -> Result<Vec<Vec<String>>, SheetError> {
        let token = self.token()?;
        let url = format!(
            "{}/spreadsheets/{}/values/{}!{}",
            self.endpoint, spreadsheet_id, sheet_name, range
        );

        let resp = self
            .client
            .get(&url)
            .query(&[("majorDimension", major_dim.as_str())])
            .bearer_auth(token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SheetError::Api(format!(
                "read request returned {}",
                resp.status()
            )));
        }

        let wire: WireValues = resp.json().await?;
        Ok(wire.values)
    }

    async fn update_range(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<(), SheetError> {
        let token = self.token()?;
        let url = format!(
            "{}/spreadsheets/{}/values/{}!{}",
            self.endpoint, spreadsheet_id, sheet_name, range
        );

        let resp = self
            .client
            .put(&url)
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(token)
            .json(&json!({ "values": values }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SheetError::Api(format!(
                "update request returned {}",
                resp.status()
            )));
        }

        Ok(())
    }

    async fn batch_format(
        &self,
        spreadsheet_id: &str,
        requests: Vec<FormatRequest>,
    ) -> Result<(), SheetError> {
        let token = self.token()?;
        let url = format!("{}/spreadsheets/{}:batchUpdate", self.endpoint, spreadsheet_id);

        let wire_requests: Vec<serde_json::Value> = requests
            .iter()
            .map(|r| {
                let (red, green, blue) = r.color.rgb();
                json!({
                    "repeatCell": {
                        "range": {
                            "sheetId": r.sheet_gid,
                            "startRowIndex": r.row_start,
                            "endRowIndex": r.row_end,
                            "startColumnIndex": r.col_start,
                            "endColumnIndex": r.col_end,
                        },
                        "cell": {
                            "userEnteredFormat": {
                                "backgroundColor": { "red": red, "green": green, "blue": blue }
                            }
                        },
                        "fields": "userEnteredFormat.backgroundColor"
                    }
                })
            })
            .collect();

        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "requests": wire_requests }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SheetError::Api(format!(
                "batch format returned {}",
                resp.status()
            )));
        }

        Ok(())
    }
}
