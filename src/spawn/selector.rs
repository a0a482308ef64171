/*
 * 角色选择器
 * 先按稀有度分桶并按权重抽桶，再在桶内均匀抽角色
 * 群专属稀有度排在最前，其后是全局启用的稀有度；都没有时对全部候选均匀抽取
 */

use indexmap::IndexMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::model::{Character, ChatId, ExclusiveGrant, GlobalRarityPolicy, RarityTag};
use crate::services::RarityPolicyProvider;
use crate::utils::{RandomGenerator, WeightedItem};

/// 策略里没写权重时使用的默认值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectorWeights {
    pub default_weight: f64,
    pub exclusive_weight: f64,
}

impl Default for SelectorWeights {
    fn default() -> Self {
        Self {
            default_weight: crate::constants::DEFAULT_RARITY_WEIGHT,
            exclusive_weight: crate::constants::DEFAULT_EXCLUSIVE_WEIGHT,
        }
    }
}

pub type RarityBuckets<'a> = IndexMap<RarityTag, Vec<&'a Character>>;

pub fn bucket_by_rarity(candidates: &[Character]) -> RarityBuckets<'_> {
    let mut buckets: RarityBuckets<'_> = IndexMap::new();
    for character in candidates {
        buckets.entry(character.rarity_tag()).or_default().push(character);
    }
    buckets
}

/// 构建按顺序排列的稀有度权重表，只包含有角色的桶
pub fn build_weighted_choices(
    buckets: &RarityBuckets<'_>,
    exclusive: Option<&ExclusiveGrant>,
    global: &GlobalRarityPolicy,
    weights: &SelectorWeights,
) -> Vec<WeightedItem<RarityTag>> {
    let usable = |weight: f64| weight.is_finite() && weight > 0.0;
    let mut choices = Vec::new();

    let exclusive_tag = exclusive.map(|grant| &grant.tag);
    if let Some(grant) = exclusive {
        let weight = grant.weight.unwrap_or(weights.exclusive_weight);
        if buckets.contains_key(&grant.tag) && usable(weight) {
            choices.push(WeightedItem::new(grant.tag.clone(), weight));
        }
    }

    for (tag, setting) in global.iter() {
        if !setting.enabled || Some(tag) == exclusive_tag || !buckets.contains_key(tag) {
            continue;
        }
        let weight = setting.weight.unwrap_or(weights.default_weight);
        if usable(weight) {
            choices.push(WeightedItem::new(tag.clone(), weight));
        }
    }

    choices
}

pub struct CharacterSelector {
    policy: Arc<dyn RarityPolicyProvider>,
    weights: SelectorWeights,
    rng: Mutex<RandomGenerator>,
}

impl CharacterSelector {
    pub fn new(policy: Arc<dyn RarityPolicyProvider>, weights: SelectorWeights, rng: RandomGenerator) -> Self {
        Self {
            policy,
            weights,
            rng: Mutex::new(rng),
        }
    }

    /// 候选为空时返回None。策略读取失败按没有策略处理
    pub async fn select(&self, candidates: &[Character], chat: ChatId) -> Option<Character> {
        if candidates.is_empty() {
            return None;
        }

        let exclusive = self.policy.exclusive_for(chat).await.unwrap_or_else(|e| {
            warn!(chat_id = %chat, "读取群专属稀有度失败: {}", e);
            None
        });
        let global = self.policy.global().await.unwrap_or_else(|e| {
            warn!(chat_id = %chat, "读取全局稀有度失败: {}", e);
            GlobalRarityPolicy::default()
        });

        self.select_with(candidates, exclusive.as_ref(), &global).cloned()
    }

    pub fn select_with<'a>(
        &self,
        candidates: &'a [Character],
        exclusive: Option<&ExclusiveGrant>,
        global: &GlobalRarityPolicy,
    ) -> Option<&'a Character> {
        let buckets = bucket_by_rarity(candidates);
        let choices = build_weighted_choices(&buckets, exclusive, global, &self.weights);

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(tag) = rng.weighted_choose(&choices) {
            if let Some(character) = buckets.get(tag).and_then(|members| rng.choose(members)) {
                return Some(*character);
            }
        }

        debug!("没有可用的稀有度权重，在 {} 个候选中均匀选择", candidates.len());
        rng.choose(candidates)
    }
}
