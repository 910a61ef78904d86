// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::event::{NotifyEvent, NotifyEventKind};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotifyError {
    /// 发布通道不可用
    #[error("Notification sink unavailable: {0}")]
    SinkUnavailable(String),
}

/// 通知器特质
///
/// 面向观察者的发布汇：按项目ID定向，投递尽力而为，
/// 单一发布者在同一项目内保序
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 发布事件
    async fn publish(&self, event: NotifyEvent) -> Result<(), NotifyError>;
}

/// 便捷发布：组装事件信封后发布
pub async fn publish_kind<N: Notifier + ?Sized>(
    notifier: &N,
    project_id: Uuid,
    kind: NotifyEventKind,
    payload: serde_json::Value,
) -> Result<(), NotifyError> {
    notifier
        .publish(NotifyEvent::new(project_id, kind, payload))
        .await
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    async fn publish(&self, event: NotifyEvent) -> Result<(), NotifyError> {
        (**self).publish(event).await
    }
}
