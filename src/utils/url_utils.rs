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

use url::{ParseError, Url};

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

/// 规范化目标域名
///
/// 接受完整URL或裸域名，返回可注册主机：小写，去掉前导`www.`
///
/// # 参数
///
/// * `input` - 用户输入的目标域名或URL
///
/// # 返回值
///
/// * `Some(String)` - 规范化后的域名
/// * `None` - 输入无法解析出主机
pub fn normalise_target_domain(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    // 先按完整URL解析，失败时按裸域名处理
    let host = match Url::parse(trimmed) {
        Ok(url) => url.host_str()?.to_string(),
        Err(_) => {
            let with_scheme = format!("https://{}", trimmed);
            let url = Url::parse(&with_scheme).ok()?;
            url.host_str()?.to_string()
        }
    };

    let lowered = host.to_lowercase();
    let stripped = lowered.strip_prefix("www.").unwrap_or(&lowered);

    if stripped.is_empty() {
        return None;
    }

    Some(stripped.to_string())
}

/// 判断候选主机是否属于目标域名
///
/// 主机等于目标域名，或以`.目标域名`结尾时匹配
pub fn host_matches_target(host: &str, target_domain: &str) -> bool {
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    host == target_domain || host.ends_with(&format!(".{}", target_domain))
}

/// 提取URL的主机并与目标域名比较
pub fn url_matches_target(url: &Url, target_domain: &str) -> bool {
    match url.host_str() {
        Some(host) => host_matches_target(host, target_domain),
        None => false,
    }
}
