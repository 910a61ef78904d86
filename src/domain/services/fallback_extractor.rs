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

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::domain::services::classification::{CandidateOrigin, LinkCandidate, parse_rel_tokens};
use crate::utils::url_utils::url_matches_target;

static ANCHOR_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*href\s*=\s*["']([^"']+)["'][^>]*>"#).expect("valid anchor regex")
});

static REL_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)rel\s*=\s*["']([^"']*)["']"#).expect("valid rel regex")
});

static META_CONTENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta\s[^>]*content\s*=\s*["']([^"']+)["'][^>]*>"#)
        .expect("valid meta regex")
});

static DATA_ATTR_JSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)data-[a-z0-9-]+\s*=\s*'(\{.*?\})'|data-[a-z0-9-]+\s*=\s*"(\{.*?\})""#)
        .expect("valid data attribute regex")
});

static SCRIPT_BODY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*>(.*?)</script>"#).expect("valid script regex")
});

static URL_LITERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>\\)]+"#).expect("valid URL literal regex"));

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));

/// 无DOM回退提取器
///
/// 对代理返回的HTML做纯文本级提取，按阶段依次尝试：
/// 正则锚、文本URL、meta标签、data属性JSON、脚本与JSON-LD体。
/// 首个命中阶段的产出即为候选集
pub struct FallbackExtractor;

impl FallbackExtractor {
    /// 从原始HTML中提取指向目标域名的候选链接
    ///
    /// # 参数
    ///
    /// * `html` - 代理返回的原始HTML
    /// * `target_domain` - 规范化后的目标域名
    pub fn extract(html: &str, target_domain: &str) -> Vec<LinkCandidate> {
        let stages: [fn(&str, &str) -> Vec<LinkCandidate>; 5] = [
            Self::regex_anchors,
            Self::text_content_urls,
            Self::meta_tags,
            Self::data_attribute_json,
            Self::script_bodies,
        ];

        for stage in stages {
            let candidates = stage(html, target_domain);
            if !candidates.is_empty() {
                return candidates;
            }
        }

        Vec::new()
    }

    /// 阶段1：正则匹配锚标签，连同rel一起捕获
    fn regex_anchors(html: &str, target_domain: &str) -> Vec<LinkCandidate> {
        let mut out = Vec::new();
        for caps in ANCHOR_TAG_RE.captures_iter(html) {
            let tag = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let href = caps.get(1).map(|m| m.as_str()).unwrap_or_default();

            if let Some(url) = matching_url(href, target_domain) {
                let rel = REL_ATTR_RE
                    .captures(tag)
                    .and_then(|c| c.get(1))
                    .map(|m| parse_rel_tokens(m.as_str()))
                    .unwrap_or_default();
                out.push(LinkCandidate {
                    url,
                    rel,
                    html: tag.to_string(),
                    origin: CandidateOrigin::Anchor,
                });
            }
        }
        dedupe(out)
    }

    /// 阶段2：文本内容中的裸URL
    ///
    /// 先剥掉脚本体与标签，属性和脚本里的URL留给后续阶段
    fn text_content_urls(html: &str, target_domain: &str) -> Vec<LinkCandidate> {
        let without_scripts = SCRIPT_BODY_RE.replace_all(html, " ");
        let text = TAG_RE.replace_all(&without_scripts, " ");
        let mut out = Vec::new();
        for m in URL_LITERAL_RE.find_iter(&text) {
            if let Some(url) = matching_url(m.as_str(), target_domain) {
                out.push(LinkCandidate {
                    url,
                    rel: Vec::new(),
                    html: stub("text", m.as_str()),
                    origin: CandidateOrigin::TextContent,
                });
            }
        }
        dedupe(out)
    }

    /// 阶段3：meta标签content中的URL
    fn meta_tags(html: &str, target_domain: &str) -> Vec<LinkCandidate> {
        let mut out = Vec::new();
        for caps in META_CONTENT_RE.captures_iter(html) {
            let content = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            for m in URL_LITERAL_RE.find_iter(content) {
                if let Some(url) = matching_url(m.as_str(), target_domain) {
                    out.push(LinkCandidate {
                        url,
                        rel: Vec::new(),
                        html: stub("meta", m.as_str()),
                        origin: CandidateOrigin::MetaTag,
                    });
                }
            }
        }
        dedupe(out)
    }

    /// 阶段4：data-*属性中的JSON串
    fn data_attribute_json(html: &str, target_domain: &str) -> Vec<LinkCandidate> {
        let mut out = Vec::new();
        for caps in DATA_ATTR_JSON_RE.captures_iter(html) {
            let blob = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(blob) {
                collect_json_urls(&value, target_domain, &mut out);
            }
        }
        dedupe(out)
    }

    /// 阶段5：脚本与JSON-LD体
    fn script_bodies(html: &str, target_domain: &str) -> Vec<LinkCandidate> {
        let mut out = Vec::new();
        for caps in SCRIPT_BODY_RE.captures_iter(html) {
            let body = caps.get(1).map(|m| m.as_str()).unwrap_or_default();

            // JSON-LD体先按JSON遍历，失败则退回字面量扫描
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(body.trim()) {
                collect_json_urls(&value, target_domain, &mut out);
                continue;
            }

            for m in URL_LITERAL_RE.find_iter(body) {
                if let Some(url) = matching_url(m.as_str(), target_domain) {
                    out.push(LinkCandidate {
                        url,
                        rel: Vec::new(),
                        html: stub("script", m.as_str()),
                        origin: CandidateOrigin::JsonBlob,
                    });
                }
            }
        }
        dedupe(out)
    }
}

fn collect_json_urls(value: &serde_json::Value, target_domain: &str, out: &mut Vec<LinkCandidate>) {
    match value {
        serde_json::Value::String(s) => {
            if let Some(url) = matching_url(s, target_domain) {
                out.push(LinkCandidate {
                    url,
                    rel: Vec::new(),
                    html: stub("json", s),
                    origin: CandidateOrigin::JsonBlob,
                });
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json_urls(item, target_domain, out);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_json_urls(item, target_domain, out);
            }
        }
        _ => {}
    }
}

fn matching_url(raw: &str, target_domain: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if url_matches_target(&url, target_domain) {
        Some(url.to_string())
    } else {
        None
    }
}

fn stub(origin: &str, url: &str) -> String {
    format!("<stub origin=\"{}\" url=\"{}\"/>", origin, url)
}

fn dedupe(candidates: Vec<LinkCandidate>) -> Vec<LinkCandidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::link::LinkClass;
    use crate::domain::services::classification::classify;

    #[test]
    fn test_regex_anchor_with_rel() {
        let html = r#"<p>intro</p><a rel="sponsored" href="https://target.com/buy">buy</a>"#;
        let candidates = FallbackExtractor::extract(html, "target.com");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].origin, CandidateOrigin::Anchor);
        assert_eq!(classify(&candidates), LinkClass::Sponsored);
    }

    #[test]
    fn test_plain_anchor_is_dofollow() {
        let html = r#"<a href="https://target.com/x">x</a>"#;
        let candidates = FallbackExtractor::extract(html, "target.com");
        assert_eq!(classify(&candidates), LinkClass::Dofollow);
    }

    #[test]
    fn test_anchor_stage_preempts_text_stage() {
        // 锚阶段已命中时文本URL不再参与
        let html = r#"
            <a href="https://target.com/x">x</a>
            <p>see also https://target.com/y</p>
        "#;
        let candidates = FallbackExtractor::extract(html, "target.com");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, "https://target.com/x");
    }

    #[test]
    fn test_text_content_fallback() {
        let html = r#"<p>visit https://target.com/promo today</p>"#;
        let candidates = FallbackExtractor::extract(html, "target.com");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].origin, CandidateOrigin::TextContent);
    }

    #[test]
    fn test_meta_tag_stage() {
        let html = r#"<meta property="og:see_also" content="https://target.com/about">"#;
        let candidates = FallbackExtractor::extract(html, "target.com");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].origin, CandidateOrigin::MetaTag);
    }

    #[test]
    fn test_data_attribute_json_stage() {
        let html = r#"<div data-config='{"partner": "https://target.com/ref"}'></div>"#;
        let candidates = FallbackExtractor::extract(html, "target.com");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].origin, CandidateOrigin::JsonBlob);
    }

    #[test]
    fn test_json_ld_stage() {
        let html = r#"<script type="application/ld+json">
            {"@context": "https://schema.org", "sameAs": ["https://target.com/profile"]}
        </script>"#;
        let candidates = FallbackExtractor::extract(html, "target.com");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, "https://target.com/profile");
    }

    #[test]
    fn test_nothing_matches() {
        let html = r#"<a href="https://other.com/x">x</a><p>https://unrelated.net</p>"#;
        let candidates = FallbackExtractor::extract(html, "target.com");
        assert!(candidates.is_empty());
        assert_eq!(classify(&candidates), LinkClass::Absent);
    }
}
