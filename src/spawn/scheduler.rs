// 刷新调度：按群计数消息，达到阈值后在后台启动刷新

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::lifecycle::{SpawnLifecycle, SpawnOutcome};
use super::state::{ChatStateStore, CountDecision};
use crate::model::InboundMessage;

#[derive(Debug)]
pub enum MessageOutcome {
    /// 私聊和频道消息不计数
    Ignored,
    Counted { count: u32 },
    /// 已在后台启动刷新
    Triggered(JoinHandle<SpawnOutcome>),
}

impl MessageOutcome {
    pub fn is_triggered(&self) -> bool {
        matches!(self, MessageOutcome::Triggered(_))
    }
}

#[derive(Clone)]
pub struct SpawnScheduler {
    store: Arc<ChatStateStore>,
    lifecycle: SpawnLifecycle,
    threshold: u32,
}

impl SpawnScheduler {
    pub fn new(store: Arc<ChatStateStore>, lifecycle: SpawnLifecycle, threshold: u32) -> Self {
        Self {
            store,
            lifecycle,
            threshold: threshold.max(1),
        }
    }

    pub async fn on_message(&self, message: &InboundMessage) -> MessageOutcome {
        if !message.chat.kind.is_group() {
            return MessageOutcome::Ignored;
        }

        let slot = self.store.entry(message.chat.id).await;
        let decision = slot.lock().await.record_message(self.threshold);

        match decision {
            CountDecision::Counted(count) => MessageOutcome::Counted { count },
            CountDecision::Trigger => {
                debug!(chat_id = %message.chat.id, "消息数达到 {}，开始刷新", self.threshold);
                let lifecycle = self.lifecycle.clone();
                let chat = message.chat.clone();
                MessageOutcome::Triggered(tokio::spawn(async move { lifecycle.run_spawn(chat).await }))
            }
        }
    }
}
