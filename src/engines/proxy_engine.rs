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

use crate::engines::traits::{EngineError, ProxyRequest, ProxyResponse, RenderingProxy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// 渲染代理客户端
///
/// 第三方渲染代理的HTTP桥接：直连被封锁时的回退通道。
/// 仅在配置了API令牌时启用
pub struct HttpRenderingProxy {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

#[derive(Serialize)]
struct ProxyWireRequest {
    url: String,
    #[serde(rename = "maxTimeout")]
    max_timeout: u64,
    render: bool,
    headers: std::collections::HashMap<String, String>,
}

#[derive(Deserialize, Debug)]
struct ProxyWireResponse {
    status: String,
    #[serde(default)]
    message: String,
    solution: Option<ProxyWireSolution>,
}

#[derive(Deserialize, Debug)]
struct ProxyWireSolution {
    status: u16,
    response: String,
    #[serde(rename = "responseTimeMs")]
    #[allow(dead_code)]
    response_time_ms: Option<u64>,
}

impl HttpRenderingProxy {
    /// 创建代理客户端
    ///
    /// # 参数
    ///
    /// * `endpoint` - 代理服务地址
    /// * `api_token` - API令牌，缺省时代理被禁用
    pub fn new(endpoint: String, api_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_token,
        }
    }
}

#[async_trait]
impl RenderingProxy for HttpRenderingProxy {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, EngineError> {
        let token = self.api_token.as_ref().ok_or(EngineError::ProxyDisabled)?;

        let start = Instant::now();

        let req_body = ProxyWireRequest {
            url: request.url.clone(),
            max_timeout: request.timeout.as_millis() as u64,
            render: request.render,
            headers: request.profile.headers(),
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&req_body)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(EngineError::RequestFailed)?;

        let wire: ProxyWireResponse = resp.json().await.map_err(EngineError::RequestFailed)?;

        if wire.status == "error" {
            return Err(EngineError::Other(format!(
                "Rendering proxy error: {}",
                wire.message
            )));
        }

        let solution = wire
            .solution
            .ok_or_else(|| EngineError::Other("Rendering proxy returned no solution".to_string()))?;

        Ok(ProxyResponse {
            status: solution.status,
            html: solution.response,
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn enabled(&self) -> bool {
        self.api_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::user_agents::HeaderProfile;
    use std::time::Duration;

    #[tokio::test]
    async fn test_disabled_without_token() {
        let proxy = HttpRenderingProxy::new("http://localhost:8191/v1".to_string(), None);
        assert!(!proxy.enabled());

        let request = ProxyRequest {
            url: "https://example.com".to_string(),
            profile: HeaderProfile::DesktopChrome,
            render: true,
            timeout: Duration::from_secs(5),
        };
        assert!(matches!(
            proxy.fetch(&request).await,
            Err(EngineError::ProxyDisabled)
        ));
    }

    #[test]
    fn test_enabled_with_token() {
        let proxy = HttpRenderingProxy::new(
            "http://localhost:8191/v1".to_string(),
            Some("token".to_string()),
        );
        assert!(proxy.enabled());
    }
}
