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

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::domain::models::link::LinkClass;
use crate::domain::models::verdict::{LinkStatus, Verdict};
use crate::domain::services::classification::{self, LinkCandidate};
use crate::domain::services::dom_extractor::DomExtractor;
use crate::domain::services::fallback_extractor::FallbackExtractor;
use crate::domain::services::indexability::{self, IndexabilityReport};
use crate::engines::traits::{
    EngineError, ProxyRequest, RenderEngine, RenderRequest, RenderedPage, RenderingProxy,
};
use crate::engines::user_agents::{HeaderProfile, STRATEGY_ORDER};
use crate::utils::retry_policy::RetryPolicy;

/// 分析器错误类型
///
/// 只有两层抓取全部失败的操作性故障才算错误；
/// 链接缺失、noindex等可判定结果走正常裁定通道
#[derive(Error, Debug)]
pub enum AnalyserError {
    /// 无法得出结论：直连与代理层都未能观测到页面内容
    #[error("Analysis inconclusive: {0}")]
    Inconclusive(String),
}

/// 分析器配置
#[derive(Debug, Clone)]
pub struct AnalyserConfig {
    /// 单次渲染软超时
    pub render_timeout: Duration,
    /// 首次渲染静置
    pub settle: Duration,
    /// 重载重试的静置
    pub reload_settle: Duration,
    /// 滚动后的等待
    pub scroll_wait: Duration,
    /// 主文档最大重定向跳数
    pub max_redirects: u32,
    /// 代理策略数
    pub proxy_retry_attempts: u32,
    /// 代理超时
    pub proxy_timeout: Duration,
    /// 单次分析的总体截止
    pub overall_deadline: Duration,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            render_timeout: Duration::from_secs(60),
            settle: Duration::from_secs(3),
            reload_settle: Duration::from_secs(5),
            scroll_wait: Duration::from_secs(2),
            max_redirects: 5,
            proxy_retry_attempts: 2,
            proxy_timeout: Duration::from_secs(60),
            overall_deadline: Duration::from_secs(180),
        }
    }
}

/// 代理回退的触发原因
enum FallbackCause {
    /// 主文档403
    Blocked(RenderedPage),
    /// DOM与重载重试后仍未找到链接
    Absent(RenderedPage),
    /// 导航失败（超时、协议错误、渲染器崩溃）
    Navigation(EngineError),
}

/// 链接分析器
///
/// 对`(source_url, target_domain)`执行多策略级联：
/// 直连渲染 → DOM提取 → 重载滚动重试 → 代理回退，
/// 最终产出结构化裁定
pub struct LinkAnalyser {
    engine: Arc<dyn RenderEngine>,
    proxy: Arc<dyn RenderingProxy>,
    config: AnalyserConfig,
}

impl LinkAnalyser {
    /// 创建链接分析器
    ///
    /// # 参数
    ///
    /// * `engine` - 直连渲染引擎
    /// * `proxy` - 渲染代理
    /// * `config` - 分析器配置
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        proxy: Arc<dyn RenderingProxy>,
        config: AnalyserConfig,
    ) -> Self {
        Self {
            engine,
            proxy,
            config,
        }
    }

    /// 分析一个链接
    ///
    /// # 参数
    ///
    /// * `source_url` - 来源页面URL
    /// * `target_domain` - 规范化后的目标域名
    ///
    /// # 返回值
    ///
    /// * `Ok(Verdict)` - 可判定的裁定（含诚实的absent）
    /// * `Err(AnalyserError)` - 两层抓取都失败，无法下结论
    #[instrument(skip(self), fields(url = %source_url, target = %target_domain))]
    pub async fn analyse(
        &self,
        source_url: &str,
        target_domain: &str,
    ) -> Result<Verdict, AnalyserError> {
        let start = Instant::now();

        let outcome = tokio::time::timeout(
            self.config.overall_deadline,
            self.analyse_inner(source_url, target_domain),
        )
        .await;

        let elapsed_ms = start.elapsed().as_millis() as i64;
        match outcome {
            Ok(Ok(mut verdict)) => {
                verdict.load_time_ms = elapsed_ms;
                info!(
                    "Verdict for {}: {} / {:?} in {}ms",
                    source_url, verdict.status, verdict.link_class, elapsed_ms
                );
                Ok(verdict)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AnalyserError::Inconclusive(
                "overall deadline exceeded".to_string(),
            )),
        }
    }

    async fn analyse_inner(
        &self,
        source_url: &str,
        target_domain: &str,
    ) -> Result<Verdict, AnalyserError> {
        // 1. 直连渲染
        let first = self.engine.render(&self.direct_request(source_url)).await;

        let page = match first {
            Ok(page) => page,
            Err(e) if e.is_retryable() => {
                warn!("Direct render of {} failed: {}, trying proxy", source_url, e);
                return self
                    .proxy_cascade(source_url, target_domain, FallbackCause::Navigation(e))
                    .await;
            }
            Err(e) => return Err(AnalyserError::Inconclusive(e.to_string())),
        };

        // 主文档403直接走代理回退
        if page.status == 403 {
            debug!("Primary document returned 403 for {}", source_url);
            return self
                .proxy_cascade(source_url, target_domain, FallbackCause::Blocked(page))
                .await;
        }

        // 非403的HTTP错误不做回退，裁定保留状态码
        if page.status >= 400 {
            return Ok(http_error_verdict(&page));
        }

        // 2. DOM提取
        let mut page = page;
        let mut candidates = self.extract_dom(&page, source_url, target_domain);

        // 4. 重载滚动重试：一次重试，不是循环
        if candidates.is_empty() {
            debug!("DOM pass found nothing on {}, reload-and-scroll retry", source_url);
            match self.engine.render(&self.reload_request(source_url)).await {
                Ok(second) => {
                    candidates = self.extract_dom(&second, source_url, target_domain);
                    page = second;
                }
                Err(e) => {
                    warn!("Reload retry failed for {}: {}", source_url, e);
                }
            }
        }

        // 5. 仍然absent时尝试代理回退
        if candidates.is_empty() {
            return self
                .proxy_cascade(source_url, target_domain, FallbackCause::Absent(page))
                .await;
        }

        // 6-7. 可索引性与最终裁定
        let report = indexability::compute(&page.html, page.header("x-robots-tag"), &page.final_url);
        Ok(build_verdict(page.status as i32, &candidates, &report))
    }

    /// 代理回退级联
    ///
    /// 最多R个策略，轮换请求头档案，策略间等待attempt*3s。
    /// 代理成功即对返回HTML做无DOM提取并收束
    async fn proxy_cascade(
        &self,
        source_url: &str,
        target_domain: &str,
        cause: FallbackCause,
    ) -> Result<Verdict, AnalyserError> {
        if !self.proxy.enabled() {
            return self.settle_without_proxy(target_domain, cause);
        }

        let mut last_error: Option<EngineError> = None;

        for attempt in 1..=self.config.proxy_retry_attempts {
            if attempt > 1 {
                sleep(RetryPolicy::proxy_strategy_wait(attempt - 1)).await;
            }

            let profile = STRATEGY_ORDER[((attempt - 1) as usize) % STRATEGY_ORDER.len()];
            let request = ProxyRequest {
                url: source_url.to_string(),
                profile,
                render: true,
                timeout: self.config.proxy_timeout,
            };

            match self.proxy.fetch(&request).await {
                Ok(resp) if resp.status >= 400 => {
                    debug!(
                        "Proxy strategy {} ({}) got status {}",
                        attempt, profile, resp.status
                    );
                    last_error = Some(EngineError::Other(format!(
                        "proxy returned status {}",
                        resp.status
                    )));
                }
                Ok(resp) => {
                    let candidates = FallbackExtractor::extract(&resp.html, target_domain);
                    info!(
                        "Proxy strategy {} ({}) succeeded, {} candidates",
                        attempt,
                        profile,
                        candidates.len()
                    );
                    return Ok(self.verdict_after_proxy(&cause, source_url, &resp.html, &candidates));
                }
                Err(e) => {
                    warn!("Proxy strategy {} ({}) failed: {}", attempt, profile, e);
                    last_error = Some(e);
                }
            }
        }

        // 策略耗尽
        match cause {
            FallbackCause::Blocked(page) => Ok(blocked_verdict(&page)),
            FallbackCause::Absent(page) => Ok(self.honest_absent(&page)),
            FallbackCause::Navigation(e) => Err(AnalyserError::Inconclusive(format!(
                "direct fetch failed ({}) and all proxy strategies failed ({})",
                e,
                last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no strategy ran".to_string())
            ))),
        }
    }

    /// 代理未配置时收束
    fn settle_without_proxy(
        &self,
        _target_domain: &str,
        cause: FallbackCause,
    ) -> Result<Verdict, AnalyserError> {
        match cause {
            FallbackCause::Blocked(page) => Ok(blocked_verdict(&page)),
            FallbackCause::Absent(page) => Ok(self.honest_absent(&page)),
            FallbackCause::Navigation(e) => Err(AnalyserError::Inconclusive(format!(
                "direct fetch failed ({}) and rendering proxy is disabled",
                e
            ))),
        }
    }

    /// 代理成功后的裁定
    ///
    /// 响应码取直连观测值，直连从未产生状态码时记0；
    /// 可索引性优先用直连页面，导航失败场景退用代理HTML的meta
    fn verdict_after_proxy(
        &self,
        cause: &FallbackCause,
        source_url: &str,
        proxy_html: &str,
        candidates: &[LinkCandidate],
    ) -> Verdict {
        match cause {
            FallbackCause::Blocked(page) | FallbackCause::Absent(page) => {
                let report =
                    indexability::compute(&page.html, page.header("x-robots-tag"), &page.final_url);
                build_verdict(page.status as i32, candidates, &report)
            }
            FallbackCause::Navigation(_) => {
                // 主文档状态从未观测到：响应码0，响应头不可用
                let report = indexability::compute(proxy_html, None, source_url);
                build_verdict(0, candidates, &report)
            }
        }
    }

    /// 直连观测到页面但代理不可用/失败：按直连观测诚实记absent
    fn honest_absent(&self, page: &RenderedPage) -> Verdict {
        let report = indexability::compute(&page.html, page.header("x-robots-tag"), &page.final_url);
        build_verdict(page.status as i32, &[], &report)
    }

    fn extract_dom(
        &self,
        page: &RenderedPage,
        source_url: &str,
        target_domain: &str,
    ) -> Vec<LinkCandidate> {
        let base = Url::parse(&page.final_url)
            .or_else(|_| Url::parse(source_url))
            .ok();
        match base {
            Some(base) => DomExtractor::extract(&page.html, &base, target_domain),
            None => Vec::new(),
        }
    }

    fn direct_request(&self, source_url: &str) -> RenderRequest {
        RenderRequest {
            url: source_url.to_string(),
            profile: HeaderProfile::random(),
            timeout: self.config.render_timeout,
            settle: self.config.settle,
            scroll_to_bottom: false,
            post_scroll_wait: Duration::ZERO,
            max_redirects: self.config.max_redirects,
        }
    }

    fn reload_request(&self, source_url: &str) -> RenderRequest {
        RenderRequest {
            url: source_url.to_string(),
            profile: HeaderProfile::random(),
            timeout: self.config.render_timeout,
            settle: self.config.reload_settle,
            scroll_to_bottom: true,
            post_scroll_wait: self.config.scroll_wait,
            max_redirects: self.config.max_redirects,
        }
    }
}

/// 由候选集与可索引性报告组装裁定
///
/// 最终状态规则：链接缺失或noindex即为problem，其余为ok
fn build_verdict(
    response_code: i32,
    candidates: &[LinkCandidate],
    report: &IndexabilityReport,
) -> Verdict {
    let link_class = classification::classify(candidates);
    let absent = candidates.is_empty();

    let status = if absent || !report.indexable {
        LinkStatus::Problem
    } else {
        LinkStatus::Ok
    };

    Verdict {
        status,
        response_code,
        indexable: report.indexable,
        link_class,
        canonical_url: if report.canonicalised {
            report.canonical_url.clone()
        } else {
            None
        },
        load_time_ms: 0,
        matched_anchor_html: classification::matched_anchor_html(candidates),
        non_indexable_reason: report.reason.clone(),
        checked_at: chrono::Utc::now(),
    }
}

/// 非403 HTTP错误的裁定：无回退，状态码保留
fn http_error_verdict(page: &RenderedPage) -> Verdict {
    Verdict {
        status: LinkStatus::Problem,
        response_code: page.status as i32,
        indexable: true,
        link_class: LinkClass::Absent,
        canonical_url: None,
        load_time_ms: 0,
        matched_anchor_html: None,
        non_indexable_reason: None,
        checked_at: chrono::Utc::now(),
    }
}

/// 直连403且代理救不回来：封锁裁定
fn blocked_verdict(page: &RenderedPage) -> Verdict {
    Verdict {
        status: LinkStatus::Problem,
        response_code: page.status as i32,
        indexable: true,
        link_class: LinkClass::Absent,
        canonical_url: None,
        load_time_ms: 0,
        matched_anchor_html: None,
        non_indexable_reason: Some("blocked".to_string()),
        checked_at: chrono::Utc::now(),
    }
}
