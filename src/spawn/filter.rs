// 刷新前的角色过滤：已下架、视频专属群、全局禁用与群专属稀有度

use tracing::warn;

use crate::model::{Character, ChatId, ExclusiveGrant, GlobalRarityPolicy, RarityTag};
use crate::services::RarityPolicyProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Removed,
    /// 视频角色只能在指定群刷新
    VideoElsewhere,
    /// 稀有度专属于其他群
    GrantedElsewhere,
    Disabled,
}

impl Verdict {
    pub fn is_allowed(self) -> bool {
        self == Verdict::Allowed
    }
}

/// 一次刷新使用的过滤规则，策略只读取一次
#[derive(Debug, Clone)]
pub struct AllowRules {
    chat: ChatId,
    video_tag: RarityTag,
    video_chat: Option<ChatId>,
    global: GlobalRarityPolicy,
    grants: Vec<ExclusiveGrant>,
}

impl AllowRules {
    pub fn new(
        chat: ChatId,
        video_tag: RarityTag,
        video_chat: Option<ChatId>,
        global: GlobalRarityPolicy,
        grants: Vec<ExclusiveGrant>,
    ) -> Self {
        Self {
            chat,
            video_tag,
            video_chat,
            global,
            grants,
        }
    }

    /// 读取策略；读取失败按无限制处理
    pub async fn load(
        policy: &dyn RarityPolicyProvider,
        chat: ChatId,
        video_tag: RarityTag,
        video_chat: Option<ChatId>,
    ) -> Self {
        let global = policy.global().await.unwrap_or_else(|e| {
            warn!(chat_id = %chat, "读取全局稀有度失败，不做限制: {}", e);
            GlobalRarityPolicy::default()
        });
        let grants = policy.exclusive_grants().await.unwrap_or_else(|e| {
            warn!(chat_id = %chat, "读取群专属稀有度失败，不做限制: {}", e);
            Vec::new()
        });

        Self::new(chat, video_tag, video_chat, global, grants)
    }

    pub fn verdict(&self, character: &Character) -> Verdict {
        if character.removed {
            return Verdict::Removed;
        }

        let tag = character.rarity_tag();

        if character.is_video && tag == self.video_tag {
            return if self.video_chat == Some(self.chat) {
                Verdict::Allowed
            } else {
                Verdict::VideoElsewhere
            };
        }

        // 本群的专属授权优先于全局禁用
        if self.grants.iter().any(|g| g.chat_id == self.chat && g.tag == tag) {
            return Verdict::Allowed;
        }

        if self.grants.iter().any(|g| g.chat_id != self.chat && g.tag == tag) {
            return Verdict::GrantedElsewhere;
        }

        if self.global.is_disabled(&tag) {
            return Verdict::Disabled;
        }

        Verdict::Allowed
    }

    pub fn allows(&self, character: &Character) -> bool {
        self.verdict(character).is_allowed()
    }

    pub fn retain_allowed(&self, catalog: Vec<Character>) -> Vec<Character> {
        catalog.into_iter().filter(|c| self.allows(c)).collect()
    }
}
