// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// 重试节奏
///
/// 两条确定性公式，便于断言与回放：
/// 队列重试按 base * 2^attempt 指数退避（封顶），
/// 代理策略间按 attempt * 3s 线性等待
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 退避基数
    pub base: Duration,
    /// 退避上限
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// 队列重试策略
    pub fn queue(base: Duration) -> Self {
        Self {
            base,
            max_backoff: Duration::from_secs(300),
        }
    }

    /// 第attempt次失败后的退避时长：base * 2^attempt，封顶
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        // 指数早在到达上限前就失去意义，先截断再乘
        let factor = 1u32 << attempt.min(16);
        self.base.saturating_mul(factor).min(self.max_backoff)
    }

    /// 重试就绪时间
    pub fn ready_at(&self, attempt: u32, failed_at: DateTime<Utc>) -> DateTime<Utc> {
        let backoff = self.backoff_after(attempt);
        failed_at + chrono::Duration::milliseconds(backoff.as_millis() as i64)
    }

    /// 代理策略间隔：attempt * 3s 线性等待
    pub fn proxy_strategy_wait(attempt: u32) -> Duration {
        Duration::from_secs(3 * attempt as u64)
    }
}

/// 判断不透明错误链是否值得重试
///
/// 类型化错误在各自模块内判断（`EngineError::is_retryable`）；
/// 这里兜住工作器循环里的anyhow链：先认reqwest来源，
/// 其余按本系统实际产出的失败拼写探测
pub fn is_retryable_error(error: &anyhow::Error) -> bool {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            return e.is_timeout() || e.is_connect();
        }
    }

    let message = error.to_string().to_lowercase();
    [
        // 引擎与代理层
        "timeout",
        "timed out",
        "renderer crashed",
        "navigation failed",
        "connection reset",
        "connection refused",
        // 队列后端
        "queue backend unavailable",
    ]
    .iter()
    .any(|p| message.contains(p))
}
