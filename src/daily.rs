/*
 * 每日领取
 * 每个用户在冷却期内只能领取一次，随机获得一个尚未拥有的角色
 * 同一用户的并发请求只处理第一个
 */

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::core::error::Result;
use crate::model::{Character, CharacterId, UserId, UserInfo};
use crate::services::{Catalog, ServiceResult};
use crate::utils::RandomGenerator;

/// 用户收藏的读写
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn owned_ids(&self, user: UserId) -> ServiceResult<HashSet<CharacterId>>;

    async fn last_daily_claim(&self, user: UserId) -> ServiceResult<Option<DateTime<Utc>>>;

    /// 追加角色并记录领取时间
    async fn grant_daily(&self, user: &UserInfo, character: &Character, at: DateTime<Utc>) -> ServiceResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DailyOutcome {
    /// 同一用户的上一次请求还没处理完
    InProgress,
    Cooldown { remaining: Duration },
    NothingAvailable,
    Granted(Character),
}

pub struct DailyClaimService {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn CollectionStore>,
    cooldown: Duration,
    in_flight: Mutex<HashSet<UserId>>,
    rng: Mutex<RandomGenerator>,
}

/// 离开作用域时释放用户的处理标记
pub struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<UserId>>,
    user: UserId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user);
    }
}

impl DailyClaimService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn CollectionStore>,
        cooldown: Duration,
        rng: RandomGenerator,
    ) -> Self {
        Self {
            catalog,
            store,
            cooldown,
            in_flight: Mutex::new(HashSet::new()),
            rng: Mutex::new(rng),
        }
    }

    pub fn try_begin(&self, user: UserId) -> Option<InFlightGuard<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(user) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: &self.in_flight,
            user,
        })
    }

    pub async fn claim(&self, user: &UserInfo) -> Result<DailyOutcome> {
        self.claim_at(user, Utc::now()).await
    }

    pub async fn claim_at(&self, user: &UserInfo, now: DateTime<Utc>) -> Result<DailyOutcome> {
        let _guard = match self.try_begin(user.id) {
            Some(guard) => guard,
            None => return Ok(DailyOutcome::InProgress),
        };

        if let Some(last) = self.store.last_daily_claim(user.id).await? {
            let elapsed = now - last;
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                debug!(user_id = %user.id, "每日领取冷却中，剩余 {}", format_remaining(remaining));
                return Ok(DailyOutcome::Cooldown { remaining });
            }
        }

        let owned = self.store.owned_ids(user.id).await?;
        let pool: Vec<Character> = self
            .catalog
            .fetch_all()
            .await?
            .into_iter()
            .filter(|c| !c.removed && !owned.contains(&c.id))
            .collect();

        let picked = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.choose(&pool).cloned()
        };
        let character = match picked {
            Some(character) => character,
            None => return Ok(DailyOutcome::NothingAvailable),
        };

        self.store.grant_daily(user, &character, now).await?;
        info!(user_id = %user.id, character_id = %character.id, "每日领取: {}", character.name);
        Ok(DailyOutcome::Granted(character))
    }
}

/// 形如 "3h 4m 5s"
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    let (hours, rest) = (secs / 3600, secs % 3600);
    format!("{}h {}m {}s", hours, rest / 60, rest % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::{MemoryCatalog, MemoryStats};

    fn service(characters: Vec<Character>) -> (DailyClaimService, Arc<MemoryStats>) {
        let stats = Arc::new(MemoryStats::new());
        let service = DailyClaimService::new(
            Arc::new(MemoryCatalog::new(characters)),
            stats.clone(),
            Duration::hours(24),
            RandomGenerator::with_seed(8),
        );
        (service, stats)
    }

    #[tokio::test]
    async fn test_grant_then_cooldown() {
        let (service, stats) = service(vec![
            Character::new("1", "A", "X", "🟢 Common"),
            Character::new("2", "B", "X", "🟢 Common"),
        ]);
        let user = UserInfo::new(5, "Sai");
        let start = Utc::now();

        let first = match service.claim_at(&user, start).await.unwrap() {
            DailyOutcome::Granted(character) => character,
            other => panic!("unexpected outcome: {:?}", other),
        };

        let later = start + Duration::hours(20);
        assert_eq!(
            service.claim_at(&user, later).await.unwrap(),
            DailyOutcome::Cooldown {
                remaining: Duration::hours(4)
            }
        );

        let next_day = start + Duration::hours(25);
        match service.claim_at(&user, next_day).await.unwrap() {
            DailyOutcome::Granted(second) => assert_ne!(second.id, first.id),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let record = stats.user(user.id).unwrap();
        assert_eq!(record.characters.len(), 2);
        assert_eq!(record.last_daily_claim, Some(next_day));

        assert_eq!(
            service.claim_at(&user, next_day + Duration::hours(25)).await.unwrap(),
            DailyOutcome::NothingAvailable
        );
    }

    #[tokio::test]
    async fn test_removed_characters_excluded() {
        let (service, _) = service(vec![Character::new("1", "A", "X", "🟢 Common").as_removed()]);
        assert_eq!(
            service.claim(&UserInfo::new(1, "Ino")).await.unwrap(),
            DailyOutcome::NothingAvailable
        );
    }

    #[tokio::test]
    async fn test_concurrent_request_in_progress() {
        let (service, _) = service(vec![Character::new("1", "A", "X", "🟢 Common")]);
        let user = UserInfo::new(2, "Choji");

        let guard = service.try_begin(user.id).unwrap();
        assert_eq!(service.claim(&user).await.unwrap(), DailyOutcome::InProgress);
        drop(guard);

        assert!(matches!(service.claim(&user).await.unwrap(), DailyOutcome::Granted(_)));
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::seconds(3 * 3600 + 4 * 60 + 5)), "3h 4m 5s");
        assert_eq!(format_remaining(Duration::seconds(-5)), "0h 0m 0s");
    }
}
