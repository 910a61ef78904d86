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

use scraper::{Html, Selector};
use url::Url;

use crate::utils::url_utils::resolve_url;

/// canonical与noindex的裁定结论
#[derive(Debug, Clone, Default)]
pub struct IndexabilityReport {
    /// 页面是否可被索引
    pub indexable: bool,
    /// 不可索引原因，或canonical化/nofollow指令记录
    pub reason: Option<String>,
    /// canonical指向的URL（解析为绝对地址）
    pub canonical_url: Option<String>,
    /// canonical是否指向不同于最终URL的地址
    pub canonicalised: bool,
}

/// 计算页面可索引性
///
/// 指令来源两处：主文档`X-Robots-Tag`响应头与页面`meta[name=robots]`。
/// `noindex`/`none`按OR规则生效；`nofollow`单独出现时不影响可索引性，
/// 但指令会被记录。canonical指向其他地址时按`canonicalised`记录，不算失败
///
/// # 参数
///
/// * `html` - 主文档DOM
/// * `x_robots_header` - 主文档的X-Robots-Tag响应头（如有）
/// * `final_url` - 跟随重定向后的最终URL
pub fn compute(
    html: &str,
    x_robots_header: Option<&str>,
    final_url: &str,
) -> IndexabilityReport {
    let document = Html::parse_document(html);

    let meta_robots = extract_meta_robots(&document);
    let canonical_url = extract_canonical(&document, final_url);

    let header_noindex = x_robots_header.map(has_noindex_directive).unwrap_or(false);
    let meta_noindex = meta_robots
        .as_deref()
        .map(has_noindex_directive)
        .unwrap_or(false);

    let header_nofollow = x_robots_header.map(has_nofollow_directive).unwrap_or(false);
    let meta_nofollow = meta_robots
        .as_deref()
        .map(has_nofollow_directive)
        .unwrap_or(false);

    let canonicalised = canonical_url
        .as_deref()
        .map(|c| !same_effective_url(c, final_url))
        .unwrap_or(false);

    // noindex按OR规则：任一来源声明即不可索引，原因回显指令来源
    if header_noindex || meta_noindex {
        let reason = if header_noindex {
            format!("X-Robots-Tag: {}", x_robots_header.unwrap_or_default().trim())
        } else {
            format!("meta robots: {}", meta_robots.as_deref().unwrap_or_default().trim())
        };
        return IndexabilityReport {
            indexable: false,
            reason: Some(reason),
            canonical_url,
            canonicalised,
        };
    }

    // canonical指向他处：可索引，原因记录为canonicalised
    if canonicalised {
        return IndexabilityReport {
            indexable: true,
            reason: Some("canonicalised".to_string()),
            canonical_url,
            canonicalised,
        };
    }

    // nofollow单独出现：可索引，但记录指令
    if header_nofollow || meta_nofollow {
        let reason = if header_nofollow {
            format!("X-Robots-Tag: {}", x_robots_header.unwrap_or_default().trim())
        } else {
            format!("meta robots: {}", meta_robots.as_deref().unwrap_or_default().trim())
        };
        return IndexabilityReport {
            indexable: true,
            reason: Some(reason),
            canonical_url,
            canonicalised,
        };
    }

    IndexabilityReport {
        indexable: true,
        reason: None,
        canonical_url,
        canonicalised,
    }
}

fn extract_meta_robots(document: &Html) -> Option<String> {
    let selector = Selector::parse("meta[name]").ok()?;
    for element in document.select(&selector) {
        let name = element.value().attr("name")?;
        if name.eq_ignore_ascii_case("robots") {
            return element.value().attr("content").map(|s| s.to_string());
        }
    }
    None
}

fn extract_canonical(document: &Html, final_url: &str) -> Option<String> {
    let selector = Selector::parse("link[rel=\"canonical\"]").ok()?;
    let href = document
        .select(&selector)
        .next()
        .and_then(|e| e.value().attr("href"))?;

    match Url::parse(final_url) {
        Ok(base) => resolve_url(&base, href).ok().map(|u| u.to_string()),
        Err(_) => Some(href.to_string()),
    }
}

fn has_noindex_directive(value: &str) -> bool {
    value
        .split(',')
        .map(|t| t.trim().to_lowercase())
        .any(|t| t == "noindex" || t == "none")
}

fn has_nofollow_directive(value: &str) -> bool {
    value
        .split(',')
        .map(|t| t.trim().to_lowercase())
        .any(|t| t == "nofollow" || t == "none")
}

/// 比较两个URL是否等效（忽略尾斜杠差异）
fn same_effective_url(a: &str, b: &str) -> bool {
    let normalise = |s: &str| s.trim_end_matches('/').to_string();
    match (Url::parse(a), Url::parse(b)) {
        (Ok(ua), Ok(ub)) => normalise(ua.as_str()) == normalise(ub.as_str()),
        _ => normalise(a) == normalise(b),
    }
}
