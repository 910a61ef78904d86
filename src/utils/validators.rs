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

use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// 验证错误类型
#[derive(Error, Debug)]
pub enum ValidationError {
    /// URL无效
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// 目标域名无效
    #[error("Invalid target domain: {0}")]
    InvalidTargetDomain(String),
    /// 检测到SSRF风险
    #[error("SSRF detected")]
    SsrfDetected,
}

/// 检查IP地址是否安全
///
/// 工作器会抓取任意第三方页面，来源URL不允许指向内网地址
pub fn is_safe_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            !ipv4.is_loopback()
                && !ipv4.is_private()
                && !ipv4.is_link_local()
                && !ipv4.is_broadcast()
                && !ipv4.is_documentation()
                && !ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => !ipv6.is_loopback() && !ipv6.is_unspecified(),
    }
}

/// 验证来源URL
///
/// 入队前的语法校验：scheme必须为http/https且含主机。
/// 字面IP主机在此同步检查；域名主机不在入队路径做DNS解析。
///
/// # 参数
///
/// * `url` - 来源URL字符串
///
/// # 返回值
///
/// * `Ok(Url)` - 解析后的URL
/// * `Err(ValidationError)` - URL无效或存在安全风险
pub fn validate_source_url(url: &str) -> Result<Url, ValidationError> {
    let parsed = Url::parse(url).map_err(|_| ValidationError::InvalidUrl(url.to_string()))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ValidationError::InvalidUrl(url.to_string()));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| ValidationError::InvalidUrl(url.to_string()))?;

    if let Ok(ip) = host.parse::<IpAddr>() {
        if !is_safe_ip(ip) {
            return Err(ValidationError::SsrfDetected);
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_http_url() {
        assert!(validate_source_url("https://example.com/page").is_ok());
        assert!(validate_source_url("http://example.com").is_ok());
    }

    #[test]
    fn test_reject_non_http_scheme() {
        assert!(validate_source_url("ftp://example.com").is_err());
        assert!(validate_source_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_reject_garbage() {
        assert!(validate_source_url("not a url").is_err());
        assert!(validate_source_url("").is_err());
    }

    #[test]
    fn test_reject_loopback_literal() {
        assert!(matches!(
            validate_source_url("http://127.0.0.1/admin"),
            Err(ValidationError::SsrfDetected)
        ));
        assert!(matches!(
            validate_source_url("http://10.0.0.5/"),
            Err(ValidationError::SsrfDetected)
        ));
    }
}
