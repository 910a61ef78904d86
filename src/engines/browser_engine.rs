// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{EngineError, RenderEngine, RenderRequest, RenderedPage};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    EventRequestWillBeSent, EventResponseReceived, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::StopLoadingParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

// Global browser instance to avoid re-launching Chrome on every request.
// Each render call still gets a fresh isolated page.
static BROWSER_INSTANCE: OnceCell<Browser> = OnceCell::const_new();

// Asynchronously gets or initializes the shared browser instance.
// This function ensures that the browser is launched only once.
async fn get_browser() -> Result<&'static Browser, EngineError> {
    BROWSER_INSTANCE
        .get_or_try_init(|| async {
            let remote_debugging_url = std::env::var("CHROMIUM_REMOTE_DEBUGGING_URL").ok();

            let (browser, mut handler) = if let Some(ref url) = remote_debugging_url {
                tracing::info!("Connecting to remote Chrome instance at: {}", url);
                Browser::connect(url).await.map_err(|e| {
                    EngineError::Other(format!("Failed to connect to remote Chrome: {}", e))
                })?
            } else {
                let mut builder = BrowserConfig::builder()
                    .no_sandbox()
                    .request_timeout(Duration::from_secs(30));

                builder = builder.arg("--disable-gpu").arg("--disable-dev-shm-usage");

                Browser::launch(builder.build().map_err(|e| EngineError::Other(e.to_string()))?)
                    .await
                    .map_err(|e| EngineError::Other(e.to_string()))?
            };

            // Spawn a handler to process browser events
            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            Ok(browser)
        })
        .await
}

/// 主文档导航观测结果
struct PrimaryDocument {
    status: u16,
    final_url: String,
    headers: HashMap<String, String>,
}

/// 浏览器渲染引擎
///
/// 基于chromiumoxide实现的直连渲染引擎：共享浏览器实例，
/// 每次调用开独立页面，退出路径上必须关闭
pub struct ChromiumRenderEngine;

impl ChromiumRenderEngine {
    /// 在已打开的页面上执行导航与提取
    ///
    /// 与`render`分离，便于无论成败都统一关闭页面
    async fn render_on_page(
        &self,
        page: &Page,
        request: &RenderRequest,
    ) -> Result<(PrimaryDocument, String), EngineError> {
        // 监听主文档响应，状态码与响应头只认Document资源
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| EngineError::Navigation(e.to_string()))?;
        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| EngineError::Navigation(e.to_string()))?;

        page.set_user_agent(request.profile.user_agent())
            .await
            .map_err(|e| EngineError::Navigation(e.to_string()))?;

        let nav = page.goto(request.url.clone());
        tokio::pin!(nav);

        let mut primary: Option<PrimaryDocument> = None;
        let mut redirect_hops: u32 = 0;
        let mut capped_url: Option<String> = None;
        let mut nav_done = false;

        while !nav_done {
            tokio::select! {
                ev = requests.next() => {
                    if let Some(ev) = ev {
                        if ev.redirect_response.is_some()
                            && matches!(ev.r#type, Some(ResourceType::Document))
                        {
                            redirect_hops += 1;
                            // 超过跳数上限时以当前跳为最终URL并停止加载
                            if redirect_hops >= request.max_redirects && capped_url.is_none() {
                                capped_url = Some(ev.request.url.clone());
                                let _ = page.execute(StopLoadingParams::default()).await;
                            }
                        }
                    }
                }
                ev = responses.next() => {
                    if let Some(ev) = ev {
                        if matches!(ev.r#type, ResourceType::Document) && primary.is_none() {
                            let mut headers = HashMap::new();
                            if let Ok(value) = serde_json::to_value(&ev.response.headers) {
                                if let Some(map) = value.as_object() {
                                    for (k, v) in map {
                                        if let Some(s) = v.as_str() {
                                            headers.insert(k.to_lowercase(), s.to_string());
                                        }
                                    }
                                }
                            }
                            primary = Some(PrimaryDocument {
                                status: ev.response.status as u16,
                                final_url: ev.response.url.clone(),
                                headers,
                            });
                        }
                    }
                }
                res = &mut nav => {
                    if let Err(e) = res {
                        // 已截断重定向链时停止加载不算导航失败
                        if capped_url.is_none() {
                            return Err(EngineError::Navigation(e.to_string()));
                        }
                    }
                    nav_done = true;
                }
            }
        }

        // DOMContentLoaded之后静置，等懒加载内容就位
        tokio::time::sleep(request.settle).await;

        if request.scroll_to_bottom {
            page.evaluate("window.scrollTo(0, document.body.scrollHeight);")
                .await
                .map_err(|e| EngineError::Navigation(e.to_string()))?;
            tokio::time::sleep(request.post_scroll_wait).await;
        }

        let html = page
            .content()
            .await
            .map_err(|e| EngineError::Navigation(e.to_string()))?;

        let mut primary = primary.ok_or_else(|| {
            EngineError::Navigation("No document response observed".to_string())
        })?;

        if let Some(url) = capped_url {
            primary.final_url = url;
        }

        Ok((primary, html))
    }
}

#[async_trait]
impl RenderEngine for ChromiumRenderEngine {
    /// 渲染页面
    ///
    /// # 参数
    ///
    /// * `request` - 渲染请求
    ///
    /// # 返回值
    ///
    /// * `Ok(RenderedPage)` - 主文档状态、响应头与序列化DOM
    /// * `Err(EngineError)` - 导航失败或超时；页面在所有路径上关闭
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, EngineError> {
        let start = Instant::now();
        let browser = get_browser().await?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| EngineError::Navigation(e.to_string()))?;

        // 整体包一层软超时；无论成败都关闭页面
        let outcome = tokio::time::timeout(request.timeout, self.render_on_page(&page, request))
            .await;

        if let Err(e) = page.close().await {
            warn!("Failed to close rendering page: {}", e);
        }

        let (primary, html) = match outcome {
            Ok(inner) => inner?,
            Err(_) => return Err(EngineError::Timeout),
        };

        debug!(
            "Rendered {} -> {} ({})",
            request.url, primary.final_url, primary.status
        );

        Ok(RenderedPage {
            status: primary.status,
            final_url: primary.final_url,
            headers: primary.headers,
            html,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// 引擎名称
    fn name(&self) -> &'static str {
        "chromium"
    }
}
