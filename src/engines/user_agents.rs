// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::fmt;

/// 请求头档案
///
/// 直连渲染与代理策略共用的轮换档案集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderProfile {
    /// 桌面Chrome
    DesktopChrome,
    /// 桌面Firefox系
    DesktopFirefox,
    /// 移动端Safari
    MobileSafari,
}

/// 代理回退按此顺序轮换档案
pub const STRATEGY_ORDER: [HeaderProfile; 3] = [
    HeaderProfile::DesktopChrome,
    HeaderProfile::DesktopFirefox,
    HeaderProfile::MobileSafari,
];

impl HeaderProfile {
    /// 随机选取一个档案
    pub fn random() -> Self {
        *STRATEGY_ORDER
            .choose(&mut rand::rng())
            .unwrap_or(&HeaderProfile::DesktopChrome)
    }

    /// 档案的User-Agent
    pub fn user_agent(&self) -> &'static str {
        match self {
            HeaderProfile::DesktopChrome => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36"
            }
            HeaderProfile::DesktopFirefox => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0"
            }
            HeaderProfile::MobileSafari => {
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 \
                 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1"
            }
        }
    }

    /// 档案的完整请求头
    pub fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), self.user_agent().to_string());
        headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        );
        headers.insert(
            "Accept-Language".to_string(),
            match self {
                HeaderProfile::MobileSafari => "en-US,en;q=0.9".to_string(),
                _ => "en-US,en;q=0.5".to_string(),
            },
        );
        headers
    }
}

impl fmt::Display for HeaderProfile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            HeaderProfile::DesktopChrome => "desktop-chrome",
            HeaderProfile::DesktopFirefox => "desktop-firefox-like",
            HeaderProfile::MobileSafari => "mobile-safari",
        };
        write!(f, "{}", s)
    }
}
