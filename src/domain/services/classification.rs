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

use crate::domain::models::link::LinkClass;

/// 候选链接来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrigin {
    /// 锚元素 a[href]
    Anchor,
    /// 图像映射 area[href]
    ImageMap,
    /// SVG链接
    Svg,
    /// 锚内图像的src
    ImageInAnchor,
    /// 表单action
    FormAction,
    /// data-href/data-url/data-link属性
    DataAttribute,
    /// 内联事件处理器
    EventHandler,
    /// 内联脚本中的URL字面量
    ScriptLiteral,
    /// 文本内容中的URL
    TextContent,
    /// meta标签
    MetaTag,
    /// JSON-LD或脚本体
    JsonBlob,
}

/// 指向目标域名的候选链接
///
/// DOM遍历与无DOM回退两条提取路径的公共产出
#[derive(Debug, Clone)]
pub struct LinkCandidate {
    /// 解析后的绝对URL
    pub url: String,
    /// rel属性的token集合（小写）
    pub rel: Vec<String>,
    /// 锚元素outerHTML，或脚本/属性来源的注记存根
    pub html: String,
    /// 来源
    pub origin: CandidateOrigin,
}

impl LinkCandidate {
    /// 候选是否不带任何限定rel（即dofollow）
    pub fn is_plain(&self) -> bool {
        !self
            .rel
            .iter()
            .any(|t| matches!(t.as_str(), "nofollow" | "sponsored" | "ugc"))
    }
}

/// 按rel语义对候选集分类
///
/// 规则：只要存在一个无限定rel的候选即为dofollow；
/// 否则在全体rel token的并集上按 sponsored ≻ ugc ≻ nofollow 取优先；
/// 空候选集为（暂定的）absent
///
/// # 参数
///
/// * `candidates` - 指向目标域名的全部候选
pub fn classify(candidates: &[LinkCandidate]) -> LinkClass {
    if candidates.is_empty() {
        return LinkClass::Absent;
    }

    // 存在dofollow兄弟时直接胜出
    if candidates.iter().any(|c| c.is_plain()) {
        return LinkClass::Dofollow;
    }

    let mut has_sponsored = false;
    let mut has_ugc = false;
    for candidate in candidates {
        for token in &candidate.rel {
            match token.as_str() {
                "sponsored" => has_sponsored = true,
                "ugc" => has_ugc = true,
                _ => {}
            }
        }
    }

    if has_sponsored {
        LinkClass::Sponsored
    } else if has_ugc {
        LinkClass::Ugc
    } else {
        LinkClass::Nofollow
    }
}

/// 选取用于裁定记录的锚HTML
///
/// 优先取真实锚元素，其次任意来源的首个候选
pub fn matched_anchor_html(candidates: &[LinkCandidate]) -> Option<String> {
    candidates
        .iter()
        .find(|c| c.origin == CandidateOrigin::Anchor)
        .or_else(|| candidates.first())
        .map(|c| c.html.clone())
}

/// 解析rel属性为小写token集合
pub fn parse_rel_tokens(rel: &str) -> Vec<String> {
    rel.split_whitespace()
        .map(|t| t.to_lowercase())
        .collect()
}
