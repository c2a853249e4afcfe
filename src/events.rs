//! 事件总线：`Orchestrator` 发布的四类事件，供外部（UI等）消费。
//! 发布/订阅模式，
//! 用 `tokio::sync::broadcast` 实现。

use crate::models::OverallStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestProgressUpdate {
    pub batch_id: String,
    pub total: u32,
    pub completed: u32,
    pub success: u32,
    pub failed: u32,
    pub percent: f32,
    pub current_point: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStatusChanged {
    pub instance_id: String,
    pub old: OverallStatus,
    pub new: OverallStatus,
    pub timestamp: DateTime<Utc>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCompleted {
    pub instance_id: String,
    pub success: bool,
    pub sub_item: Option<String>,
    pub message: Option<String>,
    pub raw: Option<f32>,
    pub eng: Option<f32>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatusChanged {
    pub batch_id: String,
    pub status: String,
    pub tested: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub in_progress: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    TestProgressUpdate(TestProgressUpdate),
    TestStatusChanged(TestStatusChanged),
    TestCompleted(TestCompleted),
    BatchStatusChanged(BatchStatusChanged),
}

/// 发布/订阅边界；真实实现基于 `tokio::sync::broadcast`，
/// 外部（例如超出范围的UI）通过 `subscribe()` 消费
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: EngineEvent);
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent>;
}

pub struct BroadcastEventPublisher {
    sender: tokio::sync::broadcast::Sender<EngineEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventPublisher for BroadcastEventPublisher {
    fn publish(&self, event: EngineEvent) {
        // 没有订阅者时发送会返回Err，属于正常情况（无人监听）
        let _ = self.sender.send(event);
    }

    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let publisher = BroadcastEventPublisher::default();
        let mut rx = publisher.subscribe();
        publisher.publish(EngineEvent::BatchStatusChanged(BatchStatusChanged {
            batch_id: "b1".into(),
            status: "Running".into(),
            tested: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            in_progress: 1,
        }));

        match rx.recv().await.unwrap() {
            EngineEvent::BatchStatusChanged(e) => assert_eq!(e.batch_id, "b1"),
            _ => panic!("wrong event variant"),
        }
    }
}
