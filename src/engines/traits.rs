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
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::engines::user_agents::HeaderProfile;

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 导航失败（协议错误、渲染器崩溃等）
    #[error("Navigation failed: {0}")]
    Navigation(String),
    /// 超时
    #[error("Timeout")]
    Timeout,
    /// 代理未配置
    #[error("Rendering proxy not configured")]
    ProxyDisabled,
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

impl EngineError {
    /// 判断错误是否可重试
    ///
    /// 可重试意味着值得换一个策略或下一层回退再试：
    /// 导航失败（含渲染器崩溃）与超时如此；代理未配置
    /// 换多少次策略都一样，视为硬失败
    pub fn is_retryable(&self) -> bool {
        match self {
            // 代理桥接的HTTP失败：连接层问题与代理服务自身的5xx
            // 换策略有救，4xx说明请求本身被拒，重试无益
            EngineError::RequestFailed(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(s) if s.is_server_error())
            }
            EngineError::Navigation(_) | EngineError::Timeout => true,
            EngineError::ProxyDisabled | EngineError::Other(_) => false,
        }
    }
}

/// 渲染请求
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// 目标URL
    pub url: String,
    /// 请求头档案（含User-Agent）
    pub profile: HeaderProfile,
    /// 软超时
    pub timeout: Duration,
    /// DOM就绪后的静置等待
    pub settle: Duration,
    /// 是否滚动到页面底部
    pub scroll_to_bottom: bool,
    /// 滚动后的额外等待
    pub post_scroll_wait: Duration,
    /// 主文档最大重定向跳数
    pub max_redirects: u32,
}

impl RenderRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            profile: HeaderProfile::DesktopChrome,
            timeout: Duration::from_secs(60),
            settle: Duration::from_secs(3),
            scroll_to_bottom: false,
            post_scroll_wait: Duration::from_secs(2),
            max_redirects: 5,
        }
    }
}

/// 渲染结果
///
/// 状态码与响应头只取主文档，绝不混入子资源
pub struct RenderedPage {
    /// 主文档HTTP状态码
    pub status: u16,
    /// 跟随重定向后的最终URL
    pub final_url: String,
    /// 主文档响应头（键小写）
    pub headers: HashMap<String, String>,
    /// 序列化后的DOM
    pub html: String,
    /// 渲染耗时（毫秒）
    pub load_time_ms: u64,
}

impl RenderedPage {
    /// 读取主文档响应头（大小写不敏感）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|s| s.as_str())
    }
}

/// 渲染引擎特质
///
/// 每次调用独占一个渲染上下文，任何退出路径都必须释放
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// 渲染页面
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, EngineError>;

    /// 引擎名称
    fn name(&self) -> &'static str;
}

/// 代理抓取请求
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// 目标URL
    pub url: String,
    /// 请求头档案
    pub profile: HeaderProfile,
    /// 是否要求代理端渲染
    pub render: bool,
    /// 超时
    pub timeout: Duration,
}

/// 代理抓取结果
pub struct ProxyResponse {
    /// HTTP状态码
    pub status: u16,
    /// 返回的HTML
    pub html: String,
    /// 代理端耗时（毫秒）
    pub response_time_ms: u64,
}

/// 渲染代理特质
///
/// 直连被封锁时的逃生通道；仅在配置了API令牌时可用
#[async_trait]
pub trait RenderingProxy: Send + Sync {
    /// 通过代理抓取页面
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, EngineError>;

    /// 代理是否已配置
    fn enabled(&self) -> bool;
}
