// 内存实现的外部服务，供命令行模拟和测试使用

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;
use tracing::debug;

use super::{Catalog, Messenger, RarityPolicyProvider, ServiceError, ServiceResult, StatsSink};
use crate::model::{
    Character, ChatId, ExclusiveGrant, GlobalRarityPolicy, Media, MessageHandle, RarityTag,
    RaritySetting, UserId, UserInfo,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 内置的演示角色
pub fn demo_characters() -> Vec<Character> {
    vec![
        Character::new("001", "Naruto Uzumaki", "Naruto", "🟢 Common"),
        Character::new("002", "Sakura Haruno", "Naruto", "🟢 Common"),
        Character::new("003", "Monkey D Luffy", "One Piece", "🟣 Rare"),
        Character::new("004", "Roronoa Zoro", "One Piece", "🟣 Rare"),
        Character::new("005", "Mikasa Ackerman", "Attack on Titan", "🟡 Legendary"),
        Character::new("006", "Rem", "Re:Zero", "💮 Exclusive"),
        Character::new("007", "Makima", "Chainsaw Man", "🔮 Limited"),
        Character::new("008", "Frieren", "Sousou no Frieren", "🎥 AMV").as_video(),
    ]
}

pub fn demo_rarity_policy() -> GlobalRarityPolicy {
    GlobalRarityPolicy::new()
        .with("🟢", RaritySetting::enabled(60.0))
        .with("🟣", RaritySetting::enabled(25.0))
        .with("🟡", RaritySetting::enabled(10.0))
        .with("💮", RaritySetting::enabled(5.0))
        .with("🔮", RaritySetting::disabled())
}

#[derive(Default)]
pub struct MemoryCatalog {
    characters: Mutex<Vec<Character>>,
    failing: AtomicBool,
}

impl MemoryCatalog {
    pub fn new(characters: Vec<Character>) -> Self {
        Self {
            characters: Mutex::new(characters),
            failing: AtomicBool::new(false),
        }
    }

    /// 从JSON数组文件加载角色
    pub fn from_json_file(path: &Path) -> crate::core::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let characters: Vec<Character> = serde_json::from_str(&content)?;
        debug!("从 {:?} 加载了 {} 个角色", path, characters.len());
        Ok(Self::new(characters))
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn fetch_all(&self) -> ServiceResult<Vec<Character>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("角色库离线".to_string()));
        }
        Ok(lock(&self.characters).clone())
    }
}

#[derive(Default)]
pub struct MemoryRarityPolicy {
    global: Mutex<GlobalRarityPolicy>,
    grants: Mutex<Vec<ExclusiveGrant>>,
    failing: AtomicBool,
}

impl MemoryRarityPolicy {
    pub fn new(global: GlobalRarityPolicy) -> Self {
        Self {
            global: Mutex::new(global),
            ..Self::default()
        }
    }

    pub fn set_global(&self, global: GlobalRarityPolicy) {
        *lock(&self.global) = global;
    }

    /// 同一 (群, 稀有度) 只保留一条
    pub fn grant(&self, grant: ExclusiveGrant) {
        let mut grants = lock(&self.grants);
        grants.retain(|g| !(g.chat_id == grant.chat_id && g.tag == grant.tag));
        grants.push(grant);
    }

    pub fn revoke(&self, chat: ChatId, tag: &RarityTag) {
        lock(&self.grants).retain(|g| !(g.chat_id == chat && &g.tag == tag));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> ServiceResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ServiceError::Unavailable("稀有度策略离线".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RarityPolicyProvider for MemoryRarityPolicy {
    async fn global(&self) -> ServiceResult<GlobalRarityPolicy> {
        self.check()?;
        Ok(lock(&self.global).clone())
    }

    async fn exclusive_grants(&self) -> ServiceResult<Vec<ExclusiveGrant>> {
        self.check()?;
        Ok(lock(&self.grants).clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub chat: ChatId,
    pub handle: MessageHandle,
    pub media: Media,
    pub caption: String,
}

pub struct MemoryMessenger {
    next_handle: AtomicI64,
    posted: Mutex<Vec<PostedMessage>>,
    live: Mutex<HashSet<(ChatId, MessageHandle)>>,
    deleted: Mutex<Vec<(ChatId, MessageHandle)>>,
    gate: Option<Arc<Semaphore>>,
    failing_posts: AtomicBool,
    failing_deletes: AtomicBool,
}

impl MemoryMessenger {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicI64::new(1),
            posted: Mutex::new(Vec::new()),
            live: Mutex::new(HashSet::new()),
            deleted: Mutex::new(Vec::new()),
            gate: None,
            failing_posts: AtomicBool::new(false),
            failing_deletes: AtomicBool::new(false),
        }
    }

    /// 发送会阻塞，直到 `release_posts` 放行
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new()
        }
    }

    pub fn release_posts(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    pub fn set_failing_posts(&self, failing: bool) {
        self.failing_posts.store(failing, Ordering::SeqCst);
    }

    /// 删除返回 MessageGone 以外的错误，消息保留
    pub fn set_failing_deletes(&self, failing: bool) {
        self.failing_deletes.store(failing, Ordering::SeqCst);
    }

    pub fn posted(&self) -> Vec<PostedMessage> {
        lock(&self.posted).clone()
    }

    pub fn posts_in(&self, chat: ChatId) -> Vec<PostedMessage> {
        lock(&self.posted)
            .iter()
            .filter(|m| m.chat == chat)
            .cloned()
            .collect()
    }

    pub fn deleted(&self) -> Vec<(ChatId, MessageHandle)> {
        lock(&self.deleted).clone()
    }

    pub fn is_live(&self, chat: ChatId, message: MessageHandle) -> bool {
        lock(&self.live).contains(&(chat, message))
    }
}

impl Default for MemoryMessenger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Messenger for MemoryMessenger {
    async fn post(&self, chat: ChatId, media: &Media, caption: &str) -> ServiceResult<MessageHandle> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| ServiceError::Unavailable("发送通道已关闭".to_string()))?
                .forget();
        }

        if self.failing_posts.load(Ordering::SeqCst) {
            return Err(ServiceError::Rejected("发送频率受限".to_string()));
        }

        let handle = MessageHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        lock(&self.live).insert((chat, handle));
        lock(&self.posted).push(PostedMessage {
            chat,
            handle,
            media: media.clone(),
            caption: caption.to_string(),
        });
        Ok(handle)
    }

    async fn delete(&self, chat: ChatId, message: MessageHandle) -> ServiceResult<()> {
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(ServiceError::Rejected("没有删除权限".to_string()));
        }
        if !lock(&self.live).remove(&(chat, message)) {
            return Err(ServiceError::MessageGone(message));
        }
        lock(&self.deleted).push((chat, message));
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserRecord {
    pub username: Option<String>,
    pub first_name: String,
    pub characters: Vec<Character>,
    /// 通过抢夺获得的次数
    pub grabs: u64,
    pub last_daily_claim: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupTotals {
    pub group_name: Option<String>,
    pub count: u64,
}

#[derive(Default)]
pub struct MemoryStats {
    users: Mutex<HashMap<UserId, UserRecord>>,
    user_group: Mutex<HashMap<(UserId, ChatId), u64>>,
    groups: Mutex<HashMap<ChatId, GroupTotals>>,
    failing: AtomicBool,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn user(&self, user: UserId) -> Option<UserRecord> {
        lock(&self.users).get(&user).cloned()
    }

    pub fn user_group_count(&self, user: UserId, chat: ChatId) -> u64 {
        lock(&self.user_group).get(&(user, chat)).copied().unwrap_or(0)
    }

    pub fn group(&self, chat: ChatId) -> Option<GroupTotals> {
        lock(&self.groups).get(&chat).cloned()
    }

    /// 按抢夺次数降序
    pub fn top_groups(&self) -> Vec<(ChatId, GroupTotals)> {
        let mut groups: Vec<_> = lock(&self.groups)
            .iter()
            .map(|(chat, totals)| (*chat, totals.clone()))
            .collect();
        groups.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(&b.0)));
        groups
    }

    fn check(&self) -> ServiceResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ServiceError::Storage("统计库写入失败".to_string()))
        } else {
            Ok(())
        }
    }

    fn upsert_user<F>(&self, user: &UserInfo, update: F)
    where
        F: FnOnce(&mut UserRecord),
    {
        let mut users = lock(&self.users);
        let record = users.entry(user.id).or_default();
        record.username = user.username.clone();
        record.first_name = user.first_name.clone();
        update(record);
    }
}

#[async_trait]
impl StatsSink for MemoryStats {
    async fn record_claim(&self, user: &UserInfo, _chat: ChatId, character: &Character) -> ServiceResult<()> {
        self.check()?;
        self.upsert_user(user, |record| {
            record.characters.push(character.clone());
            record.grabs += 1;
        });
        Ok(())
    }

    async fn bump_group_counters(
        &self,
        user: &UserInfo,
        chat: ChatId,
        group_name: Option<&str>,
    ) -> ServiceResult<()> {
        self.check()?;
        *lock(&self.user_group).entry((user.id, chat)).or_insert(0) += 1;

        let mut groups = lock(&self.groups);
        let totals = groups.entry(chat).or_default();
        if let Some(name) = group_name {
            totals.group_name = Some(name.to_string());
        }
        totals.count += 1;
        Ok(())
    }
}

#[cfg(feature = "daily-claim")]
#[async_trait]
impl crate::daily::CollectionStore for MemoryStats {
    async fn owned_ids(&self, user: UserId) -> ServiceResult<HashSet<crate::model::CharacterId>> {
        self.check()?;
        Ok(lock(&self.users)
            .get(&user)
            .map(|record| record.characters.iter().map(|c| c.id.clone()).collect())
            .unwrap_or_default())
    }

    async fn last_daily_claim(&self, user: UserId) -> ServiceResult<Option<chrono::DateTime<chrono::Utc>>> {
        self.check()?;
        Ok(lock(&self.users).get(&user).and_then(|record| record.last_daily_claim))
    }

    async fn grant_daily(
        &self,
        user: &UserInfo,
        character: &Character,
        at: chrono::DateTime<chrono::Utc>,
    ) -> ServiceResult<()> {
        self.check()?;
        self.upsert_user(user, |record| {
            record.characters.push(character.clone());
            record.last_daily_claim = Some(at);
        });
        Ok(())
    }
}
