//! 外部服务接口
//!
//! 刷新核心只通过这些接口接触外部：角色库、稀有度策略、消息发送与统计写入。
//! 传输层、媒体托管和存储引擎都在接口之外。

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::model::{
    Character, ChatId, ExclusiveGrant, GlobalRarityPolicy, Media, MessageHandle, UserInfo,
};

pub mod memory;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("服务不可用: {0}")]
    Unavailable(String),
    #[error("消息已不存在: {0}")]
    MessageGone(MessageHandle),
    #[error("请求被拒绝: {0}")]
    Rejected(String),
    #[error("存储错误: {0}")]
    Storage(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// 角色库，只读
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn fetch_all(&self) -> ServiceResult<Vec<Character>>;
}

#[async_trait]
pub trait RarityPolicyProvider: Send + Sync {
    /// 全局稀有度开关与权重
    async fn global(&self) -> ServiceResult<GlobalRarityPolicy>;

    /// 所有群专属稀有度
    async fn exclusive_grants(&self) -> ServiceResult<Vec<ExclusiveGrant>>;

    async fn exclusive_for(&self, chat: ChatId) -> ServiceResult<Option<ExclusiveGrant>> {
        Ok(self
            .exclusive_grants()
            .await?
            .into_iter()
            .find(|grant| grant.chat_id == chat))
    }
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn post(&self, chat: ChatId, media: &Media, caption: &str) -> ServiceResult<MessageHandle>;

    /// 消息已被删除时返回 `MessageGone`
    async fn delete(&self, chat: ChatId, message: MessageHandle) -> ServiceResult<()>;
}

/// 抢夺结果的持久化，两个操作都是upsert
#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn record_claim(&self, user: &UserInfo, chat: ChatId, character: &Character) -> ServiceResult<()>;

    async fn bump_group_counters(
        &self,
        user: &UserInfo,
        chat: ChatId,
        group_name: Option<&str>,
    ) -> ServiceResult<()>;
}

/// 刷新核心使用的外部服务集合
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn Catalog>,
    pub rarity: Arc<dyn RarityPolicyProvider>,
    pub messenger: Arc<dyn Messenger>,
    pub stats: Arc<dyn StatsSink>,
}

impl Services {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        rarity: Arc<dyn RarityPolicyProvider>,
        messenger: Arc<dyn Messenger>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            catalog,
            rarity,
            messenger,
            stats,
        }
    }
}
