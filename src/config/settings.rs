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

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::services::link_analyser::AnalyserConfig;
use crate::queue::memory_queue::MemoryQueueConfig;
use crate::sheets::scheduler::SchedulerConfig;
use crate::workers::link_worker::LinkWorkerConfig;

/// 应用程序配置设置
///
/// 包含数据库、工作器、队列、渲染、代理与表格服务等所有配置项
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 服务器配置
    pub server: ServerSettings,
    /// 工作器配置
    pub workers: WorkerSettings,
    /// 队列配置
    pub queue: QueueSettings,
    /// 渲染配置
    pub render: RenderSettings,
    /// 渲染代理配置
    pub proxy: ProxySettings,
    /// 表格服务配置
    pub sheets: SheetsSettings,
}

/// 数据库配置设置
#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// 服务器配置设置
#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 工作器配置设置
#[derive(Debug, Deserialize)]
pub struct WorkerSettings {
    /// 并发工作器数量
    pub concurrency: usize,
    /// 队列为空时的小睡（毫秒）
    pub idle_sleep_ms: u64,
    /// 停机排空窗口（毫秒）
    pub drain_grace_ms: u64,
}

/// 队列配置设置
#[derive(Debug, Deserialize)]
pub struct QueueSettings {
    /// 最大尝试次数
    pub max_attempts: u32,
    /// 退避基数（毫秒）
    pub backoff_base_ms: u64,
    /// 租约时长（毫秒）
    pub lease_timeout_ms: u64,
    /// 是否按job_id去重
    pub dedup_by_job_id: bool,
    /// 维护间隔（毫秒）
    pub maintenance_interval_ms: u64,
}

/// 渲染配置设置
#[derive(Debug, Deserialize)]
pub struct RenderSettings {
    /// 单次渲染软超时（毫秒）
    pub timeout_ms: u64,
    /// 首次渲染静置（毫秒）
    pub settle_ms: u64,
    /// 重载重试静置（毫秒）
    pub reload_settle_ms: u64,
    /// 滚动后等待（毫秒）
    pub scroll_wait_ms: u64,
    /// 主文档最大重定向跳数
    pub max_redirects: u32,
    /// 单次分析总体截止（毫秒）
    pub overall_deadline_ms: u64,
}

/// 渲染代理配置设置
#[derive(Debug, Deserialize)]
pub struct ProxySettings {
    /// 代理服务地址
    pub endpoint: String,
    /// API令牌，缺省时代理被禁用
    pub api_token: Option<String>,
    /// 策略数
    pub retry_attempts: u32,
    /// 代理超时（毫秒）
    pub timeout_ms: u64,
}

impl ProxySettings {
    /// 代理是否启用：配置了令牌即启用
    pub fn enabled(&self) -> bool {
        self.api_token.as_deref().map(|t| !t.is_empty()).unwrap_or(false)
    }
}

/// 表格服务配置设置
#[derive(Debug, Deserialize)]
pub struct SheetsSettings {
    /// 表格服务地址
    pub endpoint: String,
    /// API令牌
    pub api_token: Option<String>,
    /// 完成轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 单轮运行截止（毫秒）
    pub run_deadline_ms: u64,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从环境变量加载配置，支持默认值
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Start with default settings
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            // Default DB pool settings
            .set_default("database.max_connections", 100)?
            .set_default("database.min_connections", 10)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            // Default worker settings
            .set_default("workers.concurrency", 5)?
            .set_default("workers.idle_sleep_ms", 100)?
            .set_default("workers.drain_grace_ms", 30_000)?
            // Default queue settings
            .set_default("queue.max_attempts", 3)?
            .set_default("queue.backoff_base_ms", 2000)?
            // lease timeout = render timeout * 1.5
            .set_default("queue.lease_timeout_ms", 90_000)?
            .set_default("queue.dedup_by_job_id", true)?
            .set_default("queue.maintenance_interval_ms", 60_000)?
            // Default render settings
            .set_default("render.timeout_ms", 60_000)?
            .set_default("render.settle_ms", 3000)?
            .set_default("render.reload_settle_ms", 5000)?
            .set_default("render.scroll_wait_ms", 2000)?
            .set_default("render.max_redirects", 5)?
            .set_default("render.overall_deadline_ms", 180_000)?
            // Default proxy settings
            .set_default("proxy.endpoint", "http://localhost:8191/v1")?
            .set_default("proxy.retry_attempts", 2)?
            .set_default("proxy.timeout_ms", 60_000)?
            // Default sheets settings
            .set_default("sheets.endpoint", "https://sheets.googleapis.com/v4")?
            .set_default("sheets.poll_interval_ms", 500)?
            .set_default("sheets.run_deadline_ms", 900_000)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("BACKLINKRS").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// 分析器配置
    pub fn analyser_config(&self) -> AnalyserConfig {
        AnalyserConfig {
            render_timeout: Duration::from_millis(self.render.timeout_ms),
            settle: Duration::from_millis(self.render.settle_ms),
            reload_settle: Duration::from_millis(self.render.reload_settle_ms),
            scroll_wait: Duration::from_millis(self.render.scroll_wait_ms),
            max_redirects: self.render.max_redirects,
            proxy_retry_attempts: self.proxy.retry_attempts,
            proxy_timeout: Duration::from_millis(self.proxy.timeout_ms),
            overall_deadline: Duration::from_millis(self.render.overall_deadline_ms),
        }
    }

    /// 队列配置
    pub fn queue_config(&self) -> MemoryQueueConfig {
        MemoryQueueConfig {
            max_attempts: self.queue.max_attempts,
            backoff_base: Duration::from_millis(self.queue.backoff_base_ms),
            dedup_by_job_id: self.queue.dedup_by_job_id,
            ..Default::default()
        }
    }

    /// 工作器配置
    pub fn worker_config(&self) -> LinkWorkerConfig {
        LinkWorkerConfig {
            lease_timeout: Duration::from_millis(self.queue.lease_timeout_ms),
            idle_sleep: Duration::from_millis(self.workers.idle_sleep_ms),
        }
    }

    /// 调度器配置
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: Duration::from_millis(self.sheets.poll_interval_ms),
            run_deadline: Duration::from_millis(self.sheets.run_deadline_ms),
            ..Default::default()
        }
    }
}
