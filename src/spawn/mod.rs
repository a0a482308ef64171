//! 刷新与抢夺核心
//!
//! 群消息计数触发刷新，按稀有度权重选出角色并发布，
//! 随后在限定时间内接受猜名抢夺，超时则公布错过提示。
//! 每个群的状态由独立的锁保护，不同群之间互不影响。

pub mod claim;
pub mod filter;
pub mod lifecycle;
pub mod notice;
pub mod scheduler;
pub mod selector;
pub mod state;

pub use claim::{ClaimOutcome, ClaimReceipt, ClaimResolver, GuessMatcher, RejectReason};
pub use filter::{AllowRules, Verdict};
pub use lifecycle::{LifecycleSettings, SpawnLifecycle, SpawnOutcome};
pub use scheduler::{MessageOutcome, SpawnScheduler};
pub use selector::{CharacterSelector, SelectorWeights};
pub use state::{ChatSnapshot, ChatSpawnState, ChatStateStore, SpawnRecord};

use std::sync::Arc;

use crate::core::config::SpawnConfig;
use crate::model::{ChatId, ChatInfo, InboundMessage, UserInfo};
use crate::services::Services;
use crate::utils::RandomGenerator;

/// 消息接入层投递的事件
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message(InboundMessage),
    Guess {
        chat: ChatInfo,
        user: UserInfo,
        text: String,
    },
}

#[derive(Debug)]
pub enum EventOutcome {
    Message(MessageOutcome),
    Claim(ClaimOutcome),
}

#[derive(Clone)]
pub struct SpawnEngine {
    store: Arc<ChatStateStore>,
    scheduler: SpawnScheduler,
    lifecycle: SpawnLifecycle,
    resolver: ClaimResolver,
}

impl SpawnEngine {
    pub fn new(services: Services, config: &SpawnConfig) -> Self {
        let store = Arc::new(ChatStateStore::new());
        let selector = Arc::new(CharacterSelector::new(
            Arc::clone(&services.rarity),
            SelectorWeights {
                default_weight: config.rarity.default_weight,
                exclusive_weight: config.rarity.exclusive_weight,
            },
            RandomGenerator::from_optional_seed(config.general.rng_seed),
        ));
        let lifecycle = SpawnLifecycle::new(
            services.clone(),
            Arc::clone(&store),
            selector,
            LifecycleSettings {
                despawn_after: config.despawn_after(),
                missed_grace: config.missed_grace(),
                video_tag: config.video_tag(),
                video_chat: config.rarity.video_chat_id,
            },
        );
        let scheduler = SpawnScheduler::new(
            Arc::clone(&store),
            lifecycle.clone(),
            config.spawn.message_frequency,
        );
        let resolver = ClaimResolver::new(
            services,
            Arc::clone(&store),
            lifecycle.clone(),
            GuessMatcher::new(config.claim.forbidden_sequences.clone()),
        );

        Self {
            store,
            scheduler,
            lifecycle,
            resolver,
        }
    }

    pub async fn on_message(&self, message: &InboundMessage) -> MessageOutcome {
        self.scheduler.on_message(message).await
    }

    pub async fn attempt_claim(&self, chat: &ChatInfo, user: &UserInfo, guess: &str) -> ClaimOutcome {
        self.resolver.attempt_claim(chat, user, guess).await
    }

    /// 猜名不计入刷新消息数
    pub async fn dispatch(&self, event: InboundEvent) -> EventOutcome {
        match event {
            InboundEvent::Message(message) => EventOutcome::Message(self.on_message(&message).await),
            InboundEvent::Guess { chat, user, text } => {
                EventOutcome::Claim(self.attempt_claim(&chat, &user, &text).await)
            }
        }
    }

    pub async fn snapshot(&self, chat: ChatId) -> Option<ChatSnapshot> {
        self.store.snapshot(chat).await
    }

    pub async fn chats(&self) -> Vec<ChatId> {
        self.store.chat_ids().await
    }

    pub fn lifecycle(&self) -> &SpawnLifecycle {
        &self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Character, ChatKind, UserId};
    use crate::services::memory::{MemoryCatalog, MemoryMessenger, MemoryRarityPolicy, MemoryStats};
    use std::time::Duration;

    struct Harness {
        engine: SpawnEngine,
        catalog: Arc<MemoryCatalog>,
        messenger: Arc<MemoryMessenger>,
        stats: Arc<MemoryStats>,
    }

    fn harness_with(messenger: MemoryMessenger, frequency: u32, characters: Vec<Character>) -> Harness {
        let catalog = Arc::new(MemoryCatalog::new(characters));
        let messenger = Arc::new(messenger);
        let stats = Arc::new(MemoryStats::new());
        let services = Services::new(
            catalog.clone(),
            Arc::new(MemoryRarityPolicy::default()),
            messenger.clone(),
            stats.clone(),
        );

        let mut config = SpawnConfig::default();
        config.spawn.message_frequency = frequency;
        config.general.rng_seed = Some(42);

        Harness {
            engine: SpawnEngine::new(services, &config),
            catalog,
            messenger,
            stats,
        }
    }

    fn harness(frequency: u32) -> Harness {
        harness_with(
            MemoryMessenger::new(),
            frequency,
            vec![Character::new("001", "Naruto Uzumaki", "Naruto", "🟢 Common")],
        )
    }

    fn group() -> ChatInfo {
        ChatInfo::supergroup(-1001234, "Leaf Village")
    }

    fn message(chat: &ChatInfo) -> InboundMessage {
        InboundMessage::new(chat.clone(), Some(UserInfo::new(1, "Iruka")))
    }

    async fn spawn_now(h: &Harness, chat: &ChatInfo) -> SpawnOutcome {
        loop {
            if let MessageOutcome::Triggered(handle) = h.engine.on_message(&message(chat)).await {
                return handle.await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_private_chats_are_ignored() {
        let h = harness(1);
        let mut chat = group();
        chat.kind = ChatKind::Private;

        assert!(matches!(h.engine.on_message(&message(&chat)).await, MessageOutcome::Ignored));
        assert!(h.engine.snapshot(chat.id).await.is_none());
    }

    #[tokio::test]
    async fn test_threshold_counts_per_chat() {
        let h = harness(3);
        let other = ChatInfo::supergroup(-1005, "Sand Village");

        for expected in 1..3 {
            match h.engine.on_message(&message(&group())).await {
                MessageOutcome::Counted { count } => assert_eq!(count, expected),
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
        assert!(matches!(
            h.engine.on_message(&message(&other)).await,
            MessageOutcome::Counted { count: 1 }
        ));

        match h.engine.on_message(&message(&group())).await {
            MessageOutcome::Triggered(handle) => assert!(handle.await.unwrap().is_published()),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(h.messenger.posts_in(other.id).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_messages_trigger_once() {
        let h = harness_with(
            MemoryMessenger::gated(),
            40,
            vec![Character::new("001", "Naruto Uzumaki", "Naruto", "🟢 Common")],
        );

        let mut tasks = Vec::new();
        for _ in 0..400 {
            let engine = h.engine.clone();
            tasks.push(tokio::spawn(async move {
                engine.on_message(&message(&group())).await
            }));
        }

        let mut triggered = Vec::new();
        for task in tasks {
            if let MessageOutcome::Triggered(handle) = task.await.unwrap() {
                triggered.push(handle);
            }
        }
        assert_eq!(triggered.len(), 1);

        let snapshot = h.engine.snapshot(group().id).await.unwrap();
        assert!(snapshot.spawning);
        assert_eq!(snapshot.message_count, 360);

        h.messenger.release_posts(1);
        let outcome = triggered.pop().unwrap().await.unwrap();
        assert!(outcome.is_published());
        assert_eq!(h.messenger.posted().len(), 1);
        assert!(!h.engine.snapshot(group().id).await.unwrap().spawning);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_single_winner() {
        let h = harness(1);
        assert!(spawn_now(&h, &group()).await.is_published());

        let mut tasks = Vec::new();
        for id in 0..16 {
            let engine = h.engine.clone();
            tasks.push(tokio::spawn(async move {
                let user = UserInfo::new(100 + id, format!("user{}", id));
                engine.attempt_claim(&group(), &user, "naruto").await
            }));
        }

        let mut accepted = 0;
        let mut already = 0;
        for task in tasks {
            match task.await.unwrap() {
                ClaimOutcome::Accepted(_) => accepted += 1,
                ClaimOutcome::AlreadyClaimed { .. } => already += 1,
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(already, 15);

        let winner = h.engine.snapshot(group().id).await.unwrap().claimed_by.unwrap();
        let record = h.stats.user(winner).unwrap();
        assert_eq!(record.characters.len(), 1);
        assert_eq!(h.stats.user_group_count(winner, group().id), 1);
        assert_eq!(h.stats.group(group().id).unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_claim_sequence() {
        let h = harness(1);
        let chat = group();
        let user = UserInfo::new(7, "Hinata");

        assert_eq!(h.engine.attempt_claim(&chat, &user, "naruto").await, ClaimOutcome::NoActiveSpawn);

        let message = match spawn_now(&h, &chat).await {
            SpawnOutcome::Published { message, .. } => message,
            other => panic!("unexpected outcome: {:?}", other),
        };

        assert_eq!(
            h.engine.attempt_claim(&chat, &user, "").await,
            ClaimOutcome::Rejected(RejectReason::EmptyGuess)
        );
        assert_eq!(
            h.engine.attempt_claim(&chat, &user, "naruto & sasuke").await,
            ClaimOutcome::Rejected(RejectReason::ForbiddenInput)
        );
        assert_eq!(
            h.engine.attempt_claim(&chat, &user, "sasuke").await,
            ClaimOutcome::Rejected(RejectReason::WrongName {
                spawn_link: Some(format!("https://t.me/c/1234/{}", message)),
            })
        );

        let receipt = match h.engine.attempt_claim(&chat, &user, "Uzumaki Naruto").await {
            ClaimOutcome::Accepted(receipt) => receipt,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(receipt.character.name, "Naruto Uzumaki");
        assert!(!h.messenger.is_live(chat.id, message));

        assert_eq!(
            h.engine.attempt_claim(&chat, &UserInfo::new(8, "Kiba"), "naruto").await,
            ClaimOutcome::AlreadyClaimed { by: UserId(7) }
        );
        assert_eq!(
            h.stats.group(chat.id).unwrap().group_name.as_deref(),
            Some("Leaf Village")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_before_expiry_makes_timer_noop() {
        let h = harness(1);
        let chat = group();
        assert!(spawn_now(&h, &chat).await.is_published());
        assert!(h
            .engine
            .attempt_claim(&chat, &UserInfo::new(7, "Hinata"), "naruto")
            .await
            .is_accepted());

        tokio::time::sleep(Duration::from_secs(200)).await;

        assert_eq!(h.messenger.posted().len(), 1);
        assert_eq!(h.messenger.deleted().len(), 1);
        let snapshot = h.engine.snapshot(chat.id).await.unwrap();
        assert_eq!(snapshot.claimed_by, Some(UserId(7)));
        assert!(snapshot.active_spawn.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guess_after_expiry_sees_no_spawn() {
        let h = harness(1);
        let chat = group();
        assert!(spawn_now(&h, &chat).await.is_published());

        tokio::time::sleep(Duration::from_secs(185)).await;
        assert_eq!(
            h.engine.attempt_claim(&chat, &UserInfo::new(7, "Hinata"), "naruto").await,
            ClaimOutcome::NoActiveSpawn
        );
    }

    #[tokio::test]
    async fn test_stats_failure_keeps_claim_committed() {
        let h = harness(1);
        let chat = group();
        let message = match spawn_now(&h, &chat).await {
            SpawnOutcome::Published { message, .. } => message,
            other => panic!("unexpected outcome: {:?}", other),
        };
        h.stats.set_failing(true);

        assert!(h
            .engine
            .attempt_claim(&chat, &UserInfo::new(5, "Neji"), "naruto")
            .await
            .is_accepted());
        assert_eq!(
            h.engine.attempt_claim(&chat, &UserInfo::new(6, "Tenten"), "naruto").await,
            ClaimOutcome::AlreadyClaimed { by: UserId(5) }
        );

        let snapshot = h.engine.snapshot(chat.id).await.unwrap();
        assert_eq!(snapshot.claimed_by, Some(UserId(5)));
        assert!(!h.messenger.is_live(chat.id, message));
        assert!(h.stats.user(UserId(5)).is_none());
        assert!(h.stats.group(chat.id).is_none());
    }

    #[tokio::test]
    async fn test_delete_failure_does_not_block_claim() {
        let h = harness(1);
        let chat = group();
        let message = match spawn_now(&h, &chat).await {
            SpawnOutcome::Published { message, .. } => message,
            other => panic!("unexpected outcome: {:?}", other),
        };
        h.messenger.set_failing_deletes(true);

        assert!(h
            .engine
            .attempt_claim(&chat, &UserInfo::new(5, "Neji"), "uzumaki")
            .await
            .is_accepted());
        assert!(h.messenger.is_live(chat.id, message));
        assert_eq!(h.stats.user(UserId(5)).unwrap().characters.len(), 1);
        assert_eq!(h.stats.group(chat.id).unwrap().count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_survives_missed_notice_failure() {
        let h = harness(1);
        let chat = group();
        let message = match spawn_now(&h, &chat).await {
            SpawnOutcome::Published { message, .. } => message,
            other => panic!("unexpected outcome: {:?}", other),
        };
        h.messenger.set_failing_posts(true);

        tokio::time::sleep(Duration::from_secs(185)).await;
        let snapshot = h.engine.snapshot(chat.id).await.unwrap();
        assert!(snapshot.active_spawn.is_none());
        assert!(!snapshot.spawning);
        assert!(!h.messenger.is_live(chat.id, message));
        assert_eq!(h.messenger.posted().len(), 1);

        h.messenger.set_failing_posts(false);
        assert!(spawn_now(&h, &chat).await.is_published());
        assert_eq!(h.messenger.posted().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_survives_delete_failure() {
        let h = harness(1);
        let chat = group();
        let message = match spawn_now(&h, &chat).await {
            SpawnOutcome::Published { message, .. } => message,
            other => panic!("unexpected outcome: {:?}", other),
        };
        h.messenger.set_failing_deletes(true);

        tokio::time::sleep(Duration::from_secs(195)).await;
        let snapshot = h.engine.snapshot(chat.id).await.unwrap();
        assert!(snapshot.active_spawn.is_none());

        // 公告和错过提示都删不掉，但刷新已经关闭
        let posts = h.messenger.posts_in(chat.id);
        assert_eq!(posts.len(), 2);
        assert!(h.messenger.is_live(chat.id, message));
        assert!(h.messenger.is_live(chat.id, posts[1].handle));
        assert!(h.messenger.deleted().is_empty());

        h.messenger.set_failing_deletes(false);
        assert!(spawn_now(&h, &chat).await.is_published());
    }

    #[tokio::test]
    async fn test_spawning_recovers_after_catalog_outage() {
        let h = harness(2);
        let chat = group();
        h.catalog.set_failing(true);

        assert!(matches!(spawn_now(&h, &chat).await, SpawnOutcome::Failed(_)));
        assert!(!h.engine.snapshot(chat.id).await.unwrap().spawning);

        h.catalog.set_failing(false);
        assert!(spawn_now(&h, &chat).await.is_published());
    }

    #[tokio::test]
    async fn test_dispatch_routes_events() {
        let h = harness(2);
        let chat = group();
        let user = UserInfo::new(3, "Shino");

        let outcome = h
            .engine
            .dispatch(InboundEvent::Guess {
                chat: chat.clone(),
                user: user.clone(),
                text: "naruto".to_string(),
            })
            .await;
        assert!(matches!(outcome, EventOutcome::Claim(ClaimOutcome::NoActiveSpawn)));

        // 猜名不计数
        assert!(matches!(
            h.engine.dispatch(InboundEvent::Message(message(&chat))).await,
            EventOutcome::Message(MessageOutcome::Counted { count: 1 })
        ));
        match h.engine.dispatch(InboundEvent::Message(message(&chat))).await {
            EventOutcome::Message(MessageOutcome::Triggered(handle)) => {
                assert!(handle.await.unwrap().is_published())
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(h.engine.chats().await, vec![chat.id]);
    }
}
