// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 集成测试辅助件
//!
//! 内存仓库、可编程渲染引擎与表格服务桩，
//! 让执行平面在无外部依赖的情况下整体运转

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use backlinkrs::domain::models::job::Priority;
use backlinkrs::domain::models::link::{Link, LinkKind, LinkState};
use backlinkrs::domain::models::sheet::{Sheet, SheetStatus};
use backlinkrs::domain::repositories::link_repository::{LinkRepository, RepositoryError};
use backlinkrs::domain::repositories::sheet_repository::SheetRepository;
use backlinkrs::domain::repositories::user_repository::UserRepository;
use backlinkrs::engines::traits::{
    EngineError, ProxyRequest, ProxyResponse, RenderEngine, RenderRequest, RenderedPage,
    RenderingProxy,
};
use backlinkrs::sheets::client::{
    FormatRequest, MajorDimension, SheetError, SpreadsheetClient, SpreadsheetMetadata,
    WorksheetInfo,
};

/// 内存链接仓库
#[derive(Default)]
pub struct MemoryLinkRepo {
    links: Mutex<HashMap<Uuid, Link>>,
}

impl MemoryLinkRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Link> {
        self.links.lock().values().cloned().collect()
    }
}

#[async_trait]
impl LinkRepository for MemoryLinkRepo {
    async fn get_link(&self, id: Uuid) -> Result<Option<Link>, RepositoryError> {
        Ok(self.links.lock().get(&id).cloned())
    }

    async fn upsert_link(&self, link: &Link) -> Result<Link, RepositoryError> {
        self.links.lock().insert(link.id, link.clone());
        Ok(link.clone())
    }

    async fn reset_analysis(
        &self,
        project_id: Uuid,
        kind: LinkKind,
    ) -> Result<u64, RepositoryError> {
        let mut links = self.links.lock();
        let before = links.len();
        links.retain(|_, l| !(l.project_id == project_id && l.kind == kind));
        Ok((before - links.len()) as u64)
    }

    async fn list_by_project_and_kind(
        &self,
        project_id: Uuid,
        kind: LinkKind,
    ) -> Result<Vec<Link>, RepositoryError> {
        Ok(self
            .links
            .lock()
            .values()
            .filter(|l| l.project_id == project_id && l.kind == kind)
            .cloned()
            .collect())
    }

    async fn count_in_states(
        &self,
        project_id: Uuid,
        kind: LinkKind,
        states: &[LinkState],
    ) -> Result<u64, RepositoryError> {
        Ok(self
            .links
            .lock()
            .values()
            .filter(|l| {
                l.project_id == project_id && l.kind == kind && states.contains(&l.state)
            })
            .count() as u64)
    }
}

/// 内存表格仓库
#[derive(Default)]
pub struct MemorySheetRepo {
    sheets: Mutex<HashMap<Uuid, Sheet>>,
}

impl MemorySheetRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sheet: Sheet) {
        self.sheets.lock().insert(sheet.id, sheet);
    }

    pub fn get(&self, id: Uuid) -> Option<Sheet> {
        self.sheets.lock().get(&id).cloned()
    }
}

#[async_trait]
impl SheetRepository for MemorySheetRepo {
    async fn get_sheet(&self, id: Uuid) -> Result<Option<Sheet>, RepositoryError> {
        Ok(self.sheets.lock().get(&id).cloned())
    }

    async fn update_sheet(&self, sheet: &Sheet) -> Result<Sheet, RepositoryError> {
        self.sheets.lock().insert(sheet.id, sheet.clone());
        Ok(sheet.clone())
    }

    async fn update_status(&self, id: Uuid, status: SheetStatus) -> Result<(), RepositoryError> {
        if let Some(sheet) = self.sheets.lock().get_mut(&id) {
            sheet.status = status;
        }
        Ok(())
    }

    async fn list_active_sheets(&self) -> Result<Vec<Sheet>, RepositoryError> {
        let mut sheets: Vec<Sheet> = self
            .sheets
            .lock()
            .values()
            .filter(|s| s.is_schedulable())
            .cloned()
            .collect();
        sheets.sort_by_key(|s| s.next_run);
        Ok(sheets)
    }

    async fn record_run(
        &self,
        id: Uuid,
        last_run: DateTime<FixedOffset>,
        next_run: Option<DateTime<FixedOffset>>,
    ) -> Result<(), RepositoryError> {
        if let Some(sheet) = self.sheets.lock().get_mut(&id) {
            sheet.last_run = Some(last_run);
            sheet.next_run = next_run;
            sheet.run_count += 1;
        }
        Ok(())
    }
}

/// 固定优先级的用户仓库
pub struct FixedUserRepo {
    priority: Priority,
}

impl FixedUserRepo {
    pub fn with(priority: Priority) -> Self {
        Self { priority }
    }
}

#[async_trait]
impl UserRepository for FixedUserRepo {
    async fn get_user_priority(&self, _user_id: Uuid) -> Result<Priority, RepositoryError> {
        Ok(self.priority)
    }
}

/// 可编程渲染引擎
///
/// 按URL返回预置页面，未登记的URL返回导航失败
pub struct ScriptedRenderEngine {
    pages: Mutex<HashMap<String, (u16, String)>>,
}

impl ScriptedRenderEngine {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
        }
    }

    pub fn serve(&self, url: &str, status: u16, html: &str) {
        self.pages
            .lock()
            .insert(url.to_string(), (status, html.to_string()));
    }
}

impl Default for ScriptedRenderEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenderEngine for ScriptedRenderEngine {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, EngineError> {
        match self.pages.lock().get(&request.url) {
            Some((status, html)) => Ok(RenderedPage {
                status: *status,
                final_url: request.url.clone(),
                headers: HashMap::new(),
                html: html.clone(),
                load_time_ms: 1,
            }),
            None => Err(EngineError::Navigation(format!(
                "no scripted page for {}",
                request.url
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// 永远禁用的渲染代理
pub struct DisabledProxy;

#[async_trait]
impl RenderingProxy for DisabledProxy {
    async fn fetch(&self, _request: &ProxyRequest) -> Result<ProxyResponse, EngineError> {
        Err(EngineError::ProxyDisabled)
    }

    fn enabled(&self) -> bool {
        false
    }
}

/// 表格服务桩
///
/// 内存网格：列字母到第2行起的取值，写与着色全量记录
pub struct MockSpreadsheetClient {
    columns: Mutex<HashMap<String, Vec<String>>>,
    pub written: Mutex<Vec<(String, Vec<Vec<String>>)>>,
    pub formats: Mutex<Vec<FormatRequest>>,
    pub fail_reads: bool,
}

impl MockSpreadsheetClient {
    pub fn new() -> Self {
        Self {
            columns: Mutex::new(HashMap::new()),
            written: Mutex::new(Vec::new()),
            formats: Mutex::new(Vec::new()),
            fail_reads: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_reads: true,
            ..Self::new()
        }
    }

    pub fn set_column(&self, column: &str, values: Vec<&str>) {
        self.columns
            .lock()
            .insert(column.to_string(), values.iter().map(|s| s.to_string()).collect());
    }
}

impl Default for MockSpreadsheetClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpreadsheetClient for MockSpreadsheetClient {
    async fn get_metadata(&self, _spreadsheet_id: &str) -> Result<SpreadsheetMetadata, SheetError> {
        if self.fail_reads {
            return Err(SheetError::Api("metadata unavailable".to_string()));
        }
        Ok(SpreadsheetMetadata {
            worksheets: vec![WorksheetInfo {
                gid: 0,
                title: "Links".to_string(),
            }],
        })
    }

    async fn read_range(
        &self,
        _spreadsheet_id: &str,
        _sheet_name: &str,
        range: &str,
        major_dim: MajorDimension,
    ) -> Result<Vec<Vec<String>>, SheetError> {
        if self.fail_reads {
            return Err(SheetError::Api("read unavailable".to_string()));
        }

        // 范围形如"A2:A"或"H2:L"，起始列字母决定返回内容
        let start_col: String = range
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();

        let columns = self.columns.lock();
        match major_dim {
            MajorDimension::Columns => Ok(columns
                .get(&start_col)
                .map(|col| vec![col.clone()])
                .unwrap_or_default()),
            MajorDimension::Rows => Ok(Vec::new()),
        }
    }

    async fn update_range(
        &self,
        _spreadsheet_id: &str,
        _sheet_name: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<(), SheetError> {
        self.written.lock().push((range.to_string(), values));
        Ok(())
    }

    async fn batch_format(
        &self,
        _spreadsheet_id: &str,
        requests: Vec<FormatRequest>,
    ) -> Result<(), SheetError> {
        self.formats.lock().extend(requests);
        Ok(())
    }
}
