// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// 批量审核请求中的一项
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchItemDto {
    /// 来源页面URL
    #[validate(url(message = "source_url must be a valid URL"))]
    pub source_url: String,
    /// 目标域名（URL或裸域名）
    #[validate(length(min = 1, message = "target_domain must not be empty"))]
    pub target_domain: String,
}

/// 批量审核请求
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchCheckRequestDto {
    /// 所属项目ID
    pub project_id: Uuid,
    /// 提交用户ID
    pub user_id: Uuid,
    /// 审核项列表
    #[validate(
        length(min = 1, max = 1000, message = "batch must contain 1..=1000 items"),
        nested
    )]
    pub items: Vec<BatchItemDto>,
}

/// 批量提交结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSubmitResponseDto {
    /// 请求中的总项数
    pub total: usize,
    /// 实际入队的任务数
    pub enqueued: usize,
    /// 请求内去重折叠的项数
    pub deduplicated: usize,
}
