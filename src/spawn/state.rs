/*
 * 每个群的刷新状态
 * 状态按群懒创建，每个群一把互斥锁，不存在全局锁
 */

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::model::{Character, CharacterId, ChatId, MessageHandle, UserId};

/// 已发布的刷新，发布后不再修改
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRecord {
    /// 本群内递增的刷新序号，过期计时器靠它识别自己负责的刷新
    pub seq: u64,
    pub character: Character,
    pub published_at: DateTime<Utc>,
    pub message: MessageHandle,
    pub permalink: String,
}

#[derive(Debug, Default)]
pub struct ChatSpawnState {
    pub message_count: u32,
    pub spawning: bool,
    pub active_spawn: Option<SpawnRecord>,
    pub claimed_by: Option<UserId>,
    /// 本轮已经出现过的角色
    pub recently_shown: HashSet<CharacterId>,
    pub spawn_link: Option<String>,
    next_seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountDecision {
    Counted(u32),
    Trigger,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpiryDecision {
    /// 已被抢走，什么都不做
    Claimed,
    /// 计时器对应的刷新已被新刷新替换
    Superseded,
    Expired(SpawnRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publication {
    pub seq: u64,
    /// 被顶替的未抢夺公告，需要删除
    pub superseded: Option<MessageHandle>,
}

impl ChatSpawnState {
    /// 计数一条群消息。达到阈值且没有进行中的刷新时进入刷新并清零计数
    pub fn record_message(&mut self, threshold: u32) -> CountDecision {
        self.message_count = self.message_count.saturating_add(1);

        if self.message_count >= threshold && !self.spawning {
            self.spawning = true;
            self.message_count = 0;
            CountDecision::Trigger
        } else {
            CountDecision::Counted(self.message_count)
        }
    }

    /// 从允许的角色中去掉本轮已出现的；全部出现过时开始新一轮
    pub fn rotation_pool(&mut self, allowed: &[Character]) -> Vec<Character> {
        if allowed.iter().all(|c| self.recently_shown.contains(&c.id)) {
            self.recently_shown.clear();
        }

        allowed
            .iter()
            .filter(|c| !self.recently_shown.contains(&c.id))
            .cloned()
            .collect()
    }

    pub fn publish(
        &mut self,
        character: Character,
        message: MessageHandle,
        permalink: String,
        published_at: DateTime<Utc>,
    ) -> Publication {
        self.next_seq += 1;
        let seq = self.next_seq;

        let superseded = match (&self.active_spawn, self.claimed_by) {
            (Some(previous), None) => Some(previous.message),
            _ => None,
        };

        self.recently_shown.insert(character.id.clone());
        self.active_spawn = Some(SpawnRecord {
            seq,
            character,
            published_at,
            message,
            permalink: permalink.clone(),
        });
        self.claimed_by = None;
        self.spawn_link = Some(permalink);
        self.spawning = false;

        Publication { seq, superseded }
    }

    /// 只能从无到有设置一次
    pub fn mark_claimed(&mut self, user: UserId) -> Option<SpawnRecord> {
        if self.claimed_by.is_some() {
            return None;
        }

        let record = self.active_spawn.clone()?;
        self.claimed_by = Some(user);
        self.spawn_link = None;
        Some(record)
    }

    /// 过期时立即关闭刷新，删除公告和错过提示都在之后进行，
    /// 宽限期内的猜名得到 NoActiveSpawn
    pub fn expire(&mut self, seq: u64) -> ExpiryDecision {
        match &self.active_spawn {
            Some(record) if record.seq == seq => {
                if self.claimed_by.is_some() {
                    return ExpiryDecision::Claimed;
                }
                self.spawn_link = None;
                match self.active_spawn.take() {
                    Some(record) => ExpiryDecision::Expired(record),
                    None => ExpiryDecision::Superseded,
                }
            }
            _ => ExpiryDecision::Superseded,
        }
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            message_count: self.message_count,
            spawning: self.spawning,
            active_spawn: self.active_spawn.clone(),
            claimed_by: self.claimed_by,
            recently_shown: self.recently_shown.len(),
            spawn_link: self.spawn_link.clone(),
        }
    }
}

/// 某一时刻的群状态副本
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSnapshot {
    pub message_count: u32,
    pub spawning: bool,
    pub active_spawn: Option<SpawnRecord>,
    pub claimed_by: Option<UserId>,
    pub recently_shown: usize,
    pub spawn_link: Option<String>,
}

impl ChatSnapshot {
    pub fn is_claimable(&self) -> bool {
        self.active_spawn.is_some() && self.claimed_by.is_none()
    }
}

pub type ChatSlot = Arc<Mutex<ChatSpawnState>>;

#[derive(Debug, Default)]
pub struct ChatStateStore {
    chats: RwLock<HashMap<ChatId, ChatSlot>>,
}

impl ChatStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取群状态，不存在时创建
    pub async fn entry(&self, chat: ChatId) -> ChatSlot {
        if let Some(slot) = self.chats.read().await.get(&chat) {
            return Arc::clone(slot);
        }

        let mut chats = self.chats.write().await;
        Arc::clone(chats.entry(chat).or_default())
    }

    pub async fn get(&self, chat: ChatId) -> Option<ChatSlot> {
        self.chats.read().await.get(&chat).cloned()
    }

    pub async fn snapshot(&self, chat: ChatId) -> Option<ChatSnapshot> {
        let slot = self.get(chat).await?;
        let state = slot.lock().await;
        Some(state.snapshot())
    }

    pub async fn chat_ids(&self) -> Vec<ChatId> {
        let mut ids: Vec<ChatId> = self.chats.read().await.keys().copied().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(id: &str) -> Character {
        Character::new(id, format!("Name {}", id), "Anime", "🟢 Common")
    }

    #[test]
    fn test_threshold_triggers_once_while_spawning() {
        let mut state = ChatSpawnState::default();
        for i in 1..3 {
            assert_eq!(state.record_message(3), CountDecision::Counted(i));
        }
        assert_eq!(state.record_message(3), CountDecision::Trigger);
        assert!(state.spawning);
        assert_eq!(state.message_count, 0);

        // 刷新进行中时计数继续增长但不再触发
        for i in 1..=5 {
            assert_eq!(state.record_message(3), CountDecision::Counted(i));
        }

        state.spawning = false;
        assert_eq!(state.record_message(3), CountDecision::Trigger);
    }

    #[test]
    fn test_rotation_resets_when_exhausted() {
        let mut state = ChatSpawnState::default();
        let allowed = vec![character("a"), character("b")];

        state.recently_shown.insert(CharacterId::new("a"));
        let pool = state.rotation_pool(&allowed);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].id, CharacterId::new("b"));

        state.recently_shown.insert(CharacterId::new("b"));
        let pool = state.rotation_pool(&allowed);
        assert_eq!(pool.len(), 2);
        assert!(state.recently_shown.is_empty());
    }

    #[test]
    fn test_rotation_ignores_shown_characters_no_longer_allowed() {
        let mut state = ChatSpawnState::default();
        state.recently_shown.insert(CharacterId::new("gone"));
        state.recently_shown.insert(CharacterId::new("a"));

        let pool = state.rotation_pool(&[character("a")]);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_claim_only_once() {
        let mut state = ChatSpawnState::default();
        assert!(state.mark_claimed(UserId(1)).is_none());

        state.publish(character("a"), MessageHandle(10), "link".to_string(), Utc::now());
        assert!(state.mark_claimed(UserId(1)).is_some());
        assert!(state.mark_claimed(UserId(2)).is_none());
        assert_eq!(state.claimed_by, Some(UserId(1)));
        assert!(state.spawn_link.is_none());
    }

    #[test]
    fn test_expiry_decisions() {
        let mut state = ChatSpawnState::default();
        let first = state.publish(character("a"), MessageHandle(1), "l1".to_string(), Utc::now());
        assert_eq!(first.superseded, None);

        let second = state.publish(character("b"), MessageHandle(2), "l2".to_string(), Utc::now());
        assert_eq!(second.superseded, Some(MessageHandle(1)));
        assert_eq!(state.expire(first.seq), ExpiryDecision::Superseded);

        state.mark_claimed(UserId(9));
        assert_eq!(state.expire(second.seq), ExpiryDecision::Claimed);
        assert!(state.active_spawn.is_some());

        let third = state.publish(character("c"), MessageHandle(3), "l3".to_string(), Utc::now());
        assert_eq!(third.superseded, None);
        match state.expire(third.seq) {
            ExpiryDecision::Expired(record) => assert_eq!(record.message, MessageHandle(3)),
            other => panic!("unexpected decision: {:?}", other),
        }
        assert!(state.active_spawn.is_none());
        assert!(state.spawn_link.is_none());
    }

    #[tokio::test]
    async fn test_store_creates_lazily() {
        let store = ChatStateStore::new();
        assert!(store.get(ChatId(-1)).await.is_none());

        let slot = store.entry(ChatId(-1)).await;
        slot.lock().await.message_count = 4;

        let again = store.entry(ChatId(-1)).await;
        assert!(Arc::ptr_eq(&slot, &again));
        assert_eq!(store.snapshot(ChatId(-1)).await.unwrap().message_count, 4);
        assert_eq!(store.chat_ids().await, vec![ChatId(-1)]);
    }
}
