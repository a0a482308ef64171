/*
 * 抢夺判定
 * 检查顺序：没有刷新 -> 已被抢 -> 空输入 -> 禁止字符 -> 名字匹配
 * 判定和写入 claimed_by 在同一次加锁内完成，保证每个刷新只有一个人成功
 */

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::lifecycle::SpawnLifecycle;
use super::state::ChatStateStore;
use crate::model::{Character, ChatInfo, UserId, UserInfo};
use crate::services::Services;
use crate::utils::text;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    EmptyGuess,
    ForbiddenInput,
    /// 附带刷新消息的链接
    WrongName { spawn_link: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClaimReceipt {
    pub seq: u64,
    pub character: Character,
    pub user: UserInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    NoActiveSpawn,
    AlreadyClaimed { by: UserId },
    Rejected(RejectReason),
    Accepted(ClaimReceipt),
}

impl ClaimOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ClaimOutcome::Accepted(_))
    }
}

/// 猜名匹配规则，忽略大小写和多余空白
#[derive(Debug, Clone)]
pub struct GuessMatcher {
    forbidden: Vec<String>,
}

impl GuessMatcher {
    pub fn new(forbidden: Vec<String>) -> Self {
        Self { forbidden }
    }

    pub fn check_input(&self, guess: &str) -> Result<(), RejectReason> {
        if guess.trim().is_empty() {
            return Err(RejectReason::EmptyGuess);
        }
        if self.forbidden.iter().any(|seq| guess.contains(seq.as_str())) {
            return Err(RejectReason::ForbiddenInput);
        }
        Ok(())
    }

    /// 词序无关的全名、名字中的任意一个词或完整名字都算猜中
    pub fn matches(&self, guess: &str, name: &str) -> bool {
        let guess_norm = text::normalize(guess);
        let name_norm = text::normalize(name);
        if guess_norm.is_empty() {
            return false;
        }

        text::sorted_tokens(&guess_norm) == text::sorted_tokens(&name_norm)
            || text::tokens(&name_norm).iter().any(|part| *part == guess_norm)
            || guess_norm == name_norm
    }
}

impl Default for GuessMatcher {
    fn default() -> Self {
        Self::new(vec!["()".to_string(), "&".to_string()])
    }
}

#[derive(Clone)]
pub struct ClaimResolver {
    services: Services,
    store: Arc<ChatStateStore>,
    lifecycle: SpawnLifecycle,
    matcher: GuessMatcher,
}

impl ClaimResolver {
    pub fn new(
        services: Services,
        store: Arc<ChatStateStore>,
        lifecycle: SpawnLifecycle,
        matcher: GuessMatcher,
    ) -> Self {
        Self {
            services,
            store,
            lifecycle,
            matcher,
        }
    }

    pub async fn attempt_claim(&self, chat: &ChatInfo, user: &UserInfo, guess: &str) -> ClaimOutcome {
        let slot = match self.store.get(chat.id).await {
            Some(slot) => slot,
            None => return ClaimOutcome::NoActiveSpawn,
        };

        let record = {
            let mut state = slot.lock().await;

            let name = match state.active_spawn.as_ref() {
                Some(active) => active.character.name.clone(),
                None => return ClaimOutcome::NoActiveSpawn,
            };
            if let Some(by) = state.claimed_by {
                return ClaimOutcome::AlreadyClaimed { by };
            }
            if let Err(reason) = self.matcher.check_input(guess) {
                return ClaimOutcome::Rejected(reason);
            }
            if !self.matcher.matches(guess, &name) {
                debug!(chat_id = %chat.id, user_id = %user.id, "猜错: {}", guess);
                return ClaimOutcome::Rejected(RejectReason::WrongName {
                    spawn_link: state.spawn_link.clone(),
                });
            }

            match state.mark_claimed(user.id) {
                Some(record) => record,
                None => {
                    return ClaimOutcome::AlreadyClaimed {
                        by: state.claimed_by.unwrap_or(user.id),
                    }
                }
            }
        };

        info!(
            chat_id = %chat.id,
            user_id = %user.id,
            character_id = %record.character.id,
            seq = record.seq,
            "角色被抢夺: {}",
            record.character.name
        );

        self.lifecycle.delete_quietly(chat.id, record.message).await;

        if let Err(e) = self
            .services
            .stats
            .record_claim(user, chat.id, &record.character)
            .await
        {
            warn!(chat_id = %chat.id, user_id = %user.id, "写入用户收藏失败: {}", e);
        }
        if let Err(e) = self
            .services
            .stats
            .bump_group_counters(user, chat.id, chat.title.as_deref())
            .await
        {
            warn!(chat_id = %chat.id, user_id = %user.id, "更新群统计失败: {}", e);
        }

        ClaimOutcome::Accepted(ClaimReceipt {
            seq: record.seq,
            character: record.character,
            user: user.clone(),
        })
    }
}
