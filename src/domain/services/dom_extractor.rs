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
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::domain::services::classification::{CandidateOrigin, LinkCandidate, parse_rel_tokens};
use crate::utils::url_utils::{resolve_url, url_matches_target};

static URL_LITERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>\\)]+"#).expect("valid URL literal regex"));

/// DOM遍历提取器
///
/// 按固定顺序枚举页面上的链接载体，合并为单一候选列表：
/// 锚元素、图像映射、SVG链接、锚内图像、表单action、
/// data属性、内联事件处理器、内联脚本中的URL字面量
pub struct DomExtractor;

impl DomExtractor {
    /// 从渲染后的DOM中提取指向目标域名的候选链接
    ///
    /// # 参数
    ///
    /// * `html` - 序列化DOM
    /// * `base_url` - 解析相对地址的基准（最终URL）
    /// * `target_domain` - 规范化后的目标域名
    ///
    /// # 返回值
    ///
    /// 候选列表，URL去重，保留首个出现的来源
    pub fn extract(html: &str, base_url: &Url, target_domain: &str) -> Vec<LinkCandidate> {
        let document = Html::parse_document(html);
        let mut candidates: Vec<LinkCandidate> = Vec::new();

        Self::collect_anchors(&document, base_url, target_domain, &mut candidates);
        Self::collect_areas(&document, base_url, target_domain, &mut candidates);
        Self::collect_svg_links(&document, base_url, target_domain, &mut candidates);
        Self::collect_anchor_images(&document, base_url, target_domain, &mut candidates);
        Self::collect_form_actions(&document, base_url, target_domain, &mut candidates);
        Self::collect_data_attributes(&document, base_url, target_domain, &mut candidates);
        Self::collect_event_handlers(&document, target_domain, &mut candidates);
        Self::collect_script_literals(&document, target_domain, &mut candidates);

        dedupe_by_url(candidates)
    }

    fn collect_anchors(
        document: &Html,
        base_url: &Url,
        target_domain: &str,
        out: &mut Vec<LinkCandidate>,
    ) {
        let selector = Selector::parse("a[href]").expect("valid selector");
        for element in document.select(&selector) {
            let href = match element.value().attr("href") {
                Some(h) => h,
                None => continue,
            };
            if let Some(url) = resolve_matching(base_url, href, target_domain) {
                out.push(LinkCandidate {
                    url,
                    rel: rel_tokens_of(&element),
                    html: element.html(),
                    origin: CandidateOrigin::Anchor,
                });
            }
        }
    }

    fn collect_areas(
        document: &Html,
        base_url: &Url,
        target_domain: &str,
        out: &mut Vec<LinkCandidate>,
    ) {
        let selector = Selector::parse("area[href]").expect("valid selector");
        for element in document.select(&selector) {
            let href = match element.value().attr("href") {
                Some(h) => h,
                None => continue,
            };
            if let Some(url) = resolve_matching(base_url, href, target_domain) {
                out.push(LinkCandidate {
                    url,
                    rel: rel_tokens_of(&element),
                    html: element.html(),
                    origin: CandidateOrigin::ImageMap,
                });
            }
        }
    }

    fn collect_svg_links(
        document: &Html,
        base_url: &Url,
        target_domain: &str,
        out: &mut Vec<LinkCandidate>,
    ) {
        // SVG锚可能使用xlink:href，普通href的svg a已被锚选择器覆盖
        let selector = Selector::parse("svg a").expect("valid selector");
        for element in document.select(&selector) {
            let href = element
                .value()
                .attr("href")
                .or_else(|| element.value().attr("xlink:href"));
            let href = match href {
                Some(h) => h,
                None => continue,
            };
            if let Some(url) = resolve_matching(base_url, href, target_domain) {
                out.push(LinkCandidate {
                    url,
                    rel: rel_tokens_of(&element),
                    html: element.html(),
                    origin: CandidateOrigin::Svg,
                });
            }
        }
    }

    fn collect_anchor_images(
        document: &Html,
        base_url: &Url,
        target_domain: &str,
        out: &mut Vec<LinkCandidate>,
    ) {
        let selector = Selector::parse("a img[src]").expect("valid selector");
        for element in document.select(&selector) {
            let src = match element.value().attr("src") {
                Some(s) => s,
                None => continue,
            };
            if let Some(url) = resolve_matching(base_url, src, target_domain) {
                out.push(LinkCandidate {
                    url,
                    rel: Vec::new(),
                    html: element.html(),
                    origin: CandidateOrigin::ImageInAnchor,
                });
            }
        }
    }

    fn collect_form_actions(
        document: &Html,
        base_url: &Url,
        target_domain: &str,
        out: &mut Vec<LinkCandidate>,
    ) {
        let selector = Selector::parse("form[action]").expect("valid selector");
        for element in document.select(&selector) {
            let action = match element.value().attr("action") {
                Some(a) => a,
                None => continue,
            };
            if let Some(url) = resolve_matching(base_url, action, target_domain) {
                out.push(LinkCandidate {
                    html: stub_html("form-action", &url),
                    url,
                    rel: Vec::new(),
                    origin: CandidateOrigin::FormAction,
                });
            }
        }
    }

    fn collect_data_attributes(
        document: &Html,
        base_url: &Url,
        target_domain: &str,
        out: &mut Vec<LinkCandidate>,
    ) {
        for attr in ["data-href", "data-url", "data-link"] {
            let selector =
                Selector::parse(&format!("[{}]", attr)).expect("valid attribute selector");
            for element in document.select(&selector) {
                let value = match element.value().attr(attr) {
                    Some(v) => v,
                    None => continue,
                };
                if let Some(url) = resolve_matching(base_url, value, target_domain) {
                    out.push(LinkCandidate {
                        html: stub_html(attr, &url),
                        url,
                        rel: Vec::new(),
                        origin: CandidateOrigin::DataAttribute,
                    });
                }
            }
        }
    }

    fn collect_event_handlers(document: &Html, target_domain: &str, out: &mut Vec<LinkCandidate>) {
        for attr in ["onclick", "onmousedown", "onmouseup"] {
            let selector =
                Selector::parse(&format!("[{}]", attr)).expect("valid attribute selector");
            for element in document.select(&selector) {
                let value = match element.value().attr(attr) {
                    Some(v) => v,
                    None => continue,
                };
                for m in URL_LITERAL_RE.find_iter(value) {
                    if let Some(url) = literal_matching(m.as_str(), target_domain) {
                        out.push(LinkCandidate {
                            url,
                            rel: Vec::new(),
                            html: stub_html(attr, m.as_str()),
                            origin: CandidateOrigin::EventHandler,
                        });
                    }
                }
            }
        }
    }

    fn collect_script_literals(document: &Html, target_domain: &str, out: &mut Vec<LinkCandidate>) {
        let selector = Selector::parse("script:not([src])").expect("valid selector");
        for element in document.select(&selector) {
            let body: String = element.text().collect();
            for m in URL_LITERAL_RE.find_iter(&body) {
                if let Some(url) = literal_matching(m.as_str(), target_domain) {
                    out.push(LinkCandidate {
                        url,
                        rel: Vec::new(),
                        html: stub_html("script", m.as_str()),
                        origin: CandidateOrigin::ScriptLiteral,
                    });
                }
            }
        }
    }
}

fn rel_tokens_of(element: &ElementRef) -> Vec<String> {
    element
        .value()
        .attr("rel")
        .map(parse_rel_tokens)
        .unwrap_or_default()
}

/// 相对于文档解析并按目标域名过滤
fn resolve_matching(base_url: &Url, raw: &str, target_domain: &str) -> Option<String> {
    let resolved = resolve_url(base_url, raw).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    if url_matches_target(&resolved, target_domain) {
        Some(resolved.to_string())
    } else {
        None
    }
}

/// 脚本/属性来源的字面量不做相对解析
fn literal_matching(raw: &str, target_domain: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if url_matches_target(&url, target_domain) {
        Some(url.to_string())
    } else {
        None
    }
}

/// 非元素来源的注记存根
fn stub_html(origin: &str, url: &str) -> String {
    format!("<stub origin=\"{}\" url=\"{}\"/>", origin, url)
}

fn dedupe_by_url(candidates: Vec<LinkCandidate>) -> Vec<LinkCandidate> {
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

    fn base() -> Url {
        Url::parse("https://source.example/page").unwrap()
    }

    #[test]
    fn test_extracts_matching_anchor() {
        let html = r#"<html><body>
            <a rel="" href="https://target.com/x">x</a>
            <a href="https://other.com/y">y</a>
        </body></html>"#;

        let candidates = DomExtractor::extract(html, &base(), "target.com");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, "https://target.com/x");
        assert!(candidates[0].html.contains("href=\"https://target.com/x\""));
        assert_eq!(classify(&candidates), LinkClass::Dofollow);
    }

    #[test]
    fn test_subdomain_matches() {
        let html = r#"<a href="https://blog.target.com/post">p</a>"#;
        let candidates = DomExtractor::extract(html, &base(), "target.com");
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_relative_href_resolved_against_base() {
        // 相对地址解析到来源站点，不会误判为目标域名
        let html = r#"<a href="/local">l</a>"#;
        let candidates = DomExtractor::extract(html, &base(), "target.com");
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_no_candidates_anywhere_is_empty() {
        let html = r#"<html><body><p>no links at all</p></body></html>"#;
        let candidates = DomExtractor::extract(html, &base(), "target.com");
        assert!(candidates.is_empty());
        assert_eq!(classify(&candidates), LinkClass::Absent);
    }

    #[test]
    fn test_area_and_form_carriers() {
        let html = r#"<html><body>
            <map><area href="https://target.com/map" alt="m"></map>
            <form action="https://target.com/submit"></form>
        </body></html>"#;

        let candidates = DomExtractor::extract(html, &base(), "target.com");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].origin, CandidateOrigin::ImageMap);
        assert_eq!(candidates[1].origin, CandidateOrigin::FormAction);
    }

    #[test]
    fn test_data_attribute_carrier() {
        let html = r#"<div data-href="https://target.com/widget">w</div>"#;
        let candidates = DomExtractor::extract(html, &base(), "target.com");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].origin, CandidateOrigin::DataAttribute);
        assert!(candidates[0].html.starts_with("<stub"));
    }

    #[test]
    fn test_event_handler_carrier() {
        let html = r#"<button onclick="window.location='https://target.com/go'">go</button>"#;
        let candidates = DomExtractor::extract(html, &base(), "target.com");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].origin, CandidateOrigin::EventHandler);
    }

    #[test]
    fn test_script_literal_carrier() {
        let html = r#"<script>var u = "https://target.com/api/track";</script>"#;
        let candidates = DomExtractor::extract(html, &base(), "target.com");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].origin, CandidateOrigin::ScriptLiteral);
    }

    #[test]
    fn test_anchor_wins_dedupe_over_script() {
        let html = r#"<html><body>
            <a href="https://target.com/x">x</a>
            <script>var u = "https://target.com/x";</script>
        </body></html>"#;

        let candidates = DomExtractor::extract(html, &base(), "target.com");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].origin, CandidateOrigin::Anchor);
    }

    #[test]
    fn test_nofollow_rel_carried() {
        let html = r#"<a rel="nofollow ugc" href="https://target.com/x">x</a>"#;
        let candidates = DomExtractor::extract(html, &base(), "target.com");
        assert_eq!(classify(&candidates), LinkClass::Ugc);
    }
}
