// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::event::NotifyEvent;
use crate::domain::services::notifier::{Notifier, NotifyError};

/// 每项目通道容量
///
/// 慢消费者会丢最老的事件（广播语义），不会阻塞发布者
const CHANNEL_CAPACITY: usize = 256;

/// 进程内广播通知器
///
/// 按项目ID维护广播通道：发布即尽力投递给当前订阅者，
/// 无订阅者时事件直接丢弃。同一发布者在同一项目内保序
pub struct BroadcastNotifier {
    channels: DashMap<Uuid, broadcast::Sender<NotifyEvent>>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// 订阅项目事件流
    pub fn subscribe(&self, project_id: Uuid) -> broadcast::Receiver<NotifyEvent> {
        self.channels
            .entry(project_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// 当前订阅者数量
    pub fn subscriber_count(&self, project_id: Uuid) -> usize {
        self.channels
            .get(&project_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, event: NotifyEvent) -> Result<(), NotifyError> {
        let sender = self
            .channels
            .entry(event.project_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();

        // 无订阅者时send返回错误，按尽力而为语义忽略
        match sender.send(event) {
            Ok(receivers) => {
                debug!("Event delivered to {} subscribers", receivers);
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }
}
