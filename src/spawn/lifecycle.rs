/*
 * 刷新生命周期
 * 空闲 -> 刷新中 -> 可抢夺 -> 已抢夺/已过期
 *
 * 刷新流程在独立任务中执行，失败或panic都会清除 spawning 标记。
 * 过期计时器不取消，触发时根据刷新序号和 claimed_by 判断是否需要处理。
 */

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::filter::AllowRules;
use super::notice;
use super::selector::CharacterSelector;
use super::state::{ChatStateStore, ExpiryDecision};
use crate::core::error::{Result, SpawnError};
use crate::model::{Character, ChatId, ChatInfo, MessageHandle, RarityTag};
use crate::services::{ServiceError, Services};

#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleSettings {
    pub despawn_after: Duration,
    pub missed_grace: Duration,
    pub video_tag: RarityTag,
    pub video_chat: Option<ChatId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpawnOutcome {
    Published {
        seq: u64,
        character: Character,
        message: MessageHandle,
    },
    /// 角色库为空
    NoCandidates,
    /// 角色库里没有本群允许刷新的角色
    AllowFiltered,
    Failed(String),
}

impl SpawnOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, SpawnOutcome::Published { .. })
    }
}

#[derive(Clone)]
pub struct SpawnLifecycle {
    services: Services,
    store: Arc<ChatStateStore>,
    selector: Arc<CharacterSelector>,
    settings: Arc<LifecycleSettings>,
}

impl SpawnLifecycle {
    pub fn new(
        services: Services,
        store: Arc<ChatStateStore>,
        selector: Arc<CharacterSelector>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            services,
            store,
            selector,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// 执行一次刷新。调用前 spawning 已被置位，返回时一定已被清除
    pub async fn run_spawn(&self, chat: ChatInfo) -> SpawnOutcome {
        let chat_id = chat.id;
        let pipeline = self.clone();
        let task = tokio::spawn(async move { pipeline.build_and_publish(chat).await });

        let outcome = match task.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(chat_id = %chat_id, severity = ?e.severity(), "刷新失败: {}", e);
                SpawnOutcome::Failed(e.to_string())
            }
            Err(join_error) => {
                let e = SpawnError::Internal(format!("刷新任务异常退出: {}", join_error));
                error!(chat_id = %chat_id, severity = ?e.severity(), "{}", e);
                SpawnOutcome::Failed(e.to_string())
            }
        };

        if !outcome.is_published() {
            self.release_spawning(chat_id).await;
        }
        outcome
    }

    async fn build_and_publish(&self, chat: ChatInfo) -> Result<SpawnOutcome> {
        let catalog = self.services.catalog.fetch_all().await?;
        if catalog.is_empty() {
            info!(chat_id = %chat.id, "角色库为空，放弃刷新");
            return Ok(SpawnOutcome::NoCandidates);
        }

        let rules = AllowRules::load(
            self.services.rarity.as_ref(),
            chat.id,
            self.settings.video_tag.clone(),
            self.settings.video_chat,
        )
        .await;
        let allowed = rules.retain_allowed(catalog);
        if allowed.is_empty() {
            info!(chat_id = %chat.id, "没有允许在本群刷新的角色");
            return Ok(SpawnOutcome::AllowFiltered);
        }

        let slot = self.store.entry(chat.id).await;
        let pool = slot.lock().await.rotation_pool(&allowed);

        let character = match self.selector.select(&pool, chat.id).await {
            Some(character) => character,
            None => return Ok(SpawnOutcome::NoCandidates),
        };

        let caption = notice::spawn_caption(self.settings.despawn_after);
        let message = self
            .services
            .messenger
            .post(chat.id, &character.media(), &caption)
            .await?;
        let permalink = chat.permalink(message);

        let publication = slot
            .lock()
            .await
            .publish(character.clone(), message, permalink, Utc::now());

        info!(
            chat_id = %chat.id,
            character_id = %character.id,
            seq = publication.seq,
            "角色已刷新: {}",
            character.name
        );

        if let Some(previous) = publication.superseded {
            debug!(chat_id = %chat.id, "删除被顶替的刷新公告 {}", previous);
            self.delete_quietly(chat.id, previous).await;
        }

        let timer = self.clone();
        tokio::spawn(timer.expire_after(chat.id, publication.seq));

        Ok(SpawnOutcome::Published {
            seq: publication.seq,
            character,
            message,
        })
    }

    async fn release_spawning(&self, chat: ChatId) {
        let slot = self.store.entry(chat).await;
        slot.lock().await.spawning = false;
    }

    /// 过期处理：先关闭刷新，再删除公告、发送错过提示并在宽限期后删除
    pub async fn expire_after(self, chat: ChatId, seq: u64) -> ExpiryDecision {
        tokio::time::sleep(self.settings.despawn_after).await;

        let slot = match self.store.get(chat).await {
            Some(slot) => slot,
            None => return ExpiryDecision::Superseded,
        };
        let decision = slot.lock().await.expire(seq);

        match &decision {
            ExpiryDecision::Claimed => {
                debug!(chat_id = %chat, seq, "刷新已被抢夺，无需过期处理");
            }
            ExpiryDecision::Superseded => {
                debug!(chat_id = %chat, seq, "刷新已被替换，忽略过期");
            }
            ExpiryDecision::Expired(record) => {
                info!(chat_id = %chat, seq, character_id = %record.character.id, "刷新过期无人抢夺");
                self.delete_quietly(chat, record.message).await;

                let caption = notice::missed_caption(&record.character);
                match self
                    .services
                    .messenger
                    .post(chat, &record.character.media(), &caption)
                    .await
                {
                    Ok(missed) => {
                        tokio::time::sleep(self.settings.missed_grace).await;
                        self.delete_quietly(chat, missed).await;
                    }
                    Err(e) => warn!(chat_id = %chat, "发送错过提示失败: {}", e),
                }
            }
        }

        decision
    }

    pub(crate) async fn delete_quietly(&self, chat: ChatId, message: MessageHandle) {
        match self.services.messenger.delete(chat, message).await {
            Ok(()) => {}
            Err(ServiceError::MessageGone(_)) => {
                debug!(chat_id = %chat, "消息 {} 已不存在", message);
            }
            Err(e) => warn!(chat_id = %chat, "删除消息 {} 失败: {}", message, e),
        }
    }
}
