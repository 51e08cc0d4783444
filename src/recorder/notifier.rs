//! # 追踪完成通知
//!
//! 通知只是提示性的：发布失败只记日志，不重试，也不影响持久化。
//! 订阅者收到事件时，完整记录未必已经可读。

use std::sync::Arc;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::models::TraceSummary;
use crate::cache::{UnifiedCacheManager, namespaced};
use crate::config::RecorderConfig;
use crate::error::{RecorderError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lwarn};

/// 追踪完成事件名
pub const TRACE_COMPLETED_EVENT: &str = "trace-completed";

const LOCAL_CHANNEL_CAPACITY: usize = 256;

/// 发布出去的事件：事件名 + 文本负载
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub event: String,
    pub payload: String,
}

/// 事件发布通道
#[async_trait]
pub trait Publisher: Send + Sync {
    /// 通道名称，用于日志
    fn name(&self) -> &'static str;

    /// 发布一条事件；没有订阅者不算错误
    async fn publish(&self, event: &str, payload: &str) -> Result<()>;
}

/// 进程内广播，支撑 SSE 事件流
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<TraceEvent>,
}

impl BroadcastPublisher {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 订阅后续事件
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TraceEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(LOCAL_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl Publisher for BroadcastPublisher {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn publish(&self, event: &str, payload: &str) -> Result<()> {
        // 只有在没有接收者时才会返回错误
        let _ = self.sender.send(TraceEvent {
            event: event.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}

/// Redis PUBLISH，跨进程的观察者也能收到
#[derive(Clone)]
pub struct RedisPublisher {
    connection: ConnectionManager,
    channel: String,
}

impl RedisPublisher {
    #[must_use]
    pub fn new(connection: ConnectionManager, channel: impl Into<String>) -> Self {
        Self {
            connection,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn publish(&self, event: &str, payload: &str) -> Result<()> {
        let message = serde_json::to_string(&TraceEvent {
            event: event.to_string(),
            payload: payload.to_string(),
        })?;
        let mut conn = self.connection.clone();
        let _receivers: i64 = conn.publish(&self.channel, message).await.map_err(|e| {
            RecorderError::notification_with_source(format!("发布到 Redis 频道失败: {}", self.channel), e)
        })?;
        Ok(())
    }
}

/// 把追踪完成事件扇出到所有通道
pub struct Notifier {
    local: Arc<BroadcastPublisher>,
    publishers: Vec<Arc<dyn Publisher>>,
}

impl Notifier {
    /// 只有进程内广播的通知器
    #[must_use]
    pub fn local_only() -> Self {
        let local = Arc::new(BroadcastPublisher::default());
        Self {
            publishers: vec![Arc::clone(&local) as Arc<dyn Publisher>],
            local,
        }
    }

    /// 共享存储是 Redis 时额外挂上 Redis 发布通道
    #[must_use]
    pub fn from_cache(cache: &UnifiedCacheManager, config: &RecorderConfig) -> Self {
        let mut notifier = Self::local_only();
        if let Some(connection) = cache.redis_connection() {
            let channel = namespaced(cache.namespace(), &config.event_channel);
            notifier.add_publisher(Arc::new(RedisPublisher::new(connection, channel)));
        }
        notifier
    }

    pub fn add_publisher(&mut self, publisher: Arc<dyn Publisher>) {
        self.publishers.push(publisher);
    }

    /// 订阅进程内事件
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TraceEvent> {
        self.local.subscribe()
    }

    /// 发布追踪完成事件。失败只记日志，返回成功送达的通道数
    pub async fn publish(&self, summary: &TraceSummary) -> usize {
        let payload = match serde_json::to_string(summary) {
            Ok(payload) => payload,
            Err(e) => {
                lwarn!(
                    &summary.id,
                    LogStage::Notification,
                    LogComponent::Notifier,
                    "serialize_summary",
                    &format!("序列化追踪摘要失败: {e}")
                );
                return 0;
            }
        };

        let mut delivered = 0;
        for publisher in &self.publishers {
            match publisher.publish(TRACE_COMPLETED_EVENT, &payload).await {
                Ok(()) => delivered += 1,
                Err(e) => lwarn!(
                    &summary.id,
                    LogStage::Notification,
                    LogComponent::Notifier,
                    "publish_failed",
                    &format!("追踪完成通知发布失败: {e}"),
                    channel = publisher.name()
                ),
            }
        }

        ldebug!(
            &summary.id,
            LogStage::Notification,
            LogComponent::Notifier,
            "published",
            "追踪完成通知已发布",
            delivered = delivered
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::models::RequestMeta;
    use crate::recorder::session::Recorder;

    struct BrokenPublisher;

    #[async_trait]
    impl Publisher for BrokenPublisher {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn publish(&self, _event: &str, _payload: &str) -> Result<()> {
            Err(RecorderError::notification("transport down"))
        }
    }

    #[tokio::test]
    async fn test_local_subscriber_receives_summary() {
        let notifier = Notifier::local_only();
        let mut events = notifier.subscribe();
        let summary = Recorder::new(RequestMeta::default()).finish().summary;

        assert_eq!(notifier.publish(&summary).await, 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event.event, TRACE_COMPLETED_EVENT);
        let payload: TraceSummary = serde_json::from_str(&event.payload).unwrap();
        assert_eq!(payload, summary);
    }

    #[tokio::test]
    async fn test_no_subscribers_is_not_an_error() {
        let notifier = Notifier::local_only();
        let summary = Recorder::new(RequestMeta::default()).finish().summary;
        assert_eq!(notifier.publish(&summary).await, 1);
    }

    #[tokio::test]
    async fn test_failing_publisher_is_skipped() {
        let mut notifier = Notifier::local_only();
        notifier.add_publisher(Arc::new(BrokenPublisher));
        let mut events = notifier.subscribe();
        let summary = Recorder::new(RequestMeta::default()).finish().summary;

        assert_eq!(notifier.publish(&summary).await, 1);
        assert!(events.recv().await.is_ok());
    }

    #[test]
    fn test_memory_cache_has_no_remote_publisher() {
        let notifier = Notifier::from_cache(&UnifiedCacheManager::memory(), &RecorderConfig::default());
        assert_eq!(notifier.publishers.len(), 1);
    }
}
