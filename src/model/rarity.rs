// 稀有度标记与刷新策略数据

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::chat::ChatId;

pub const DEFAULT_RARITY_LABEL: &str = "🟢 Common";
pub const VIDEO_RARITY_TAG: &str = "🎥";

/// 稀有度标签的首个词（通常是表情），用于分桶和权重
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RarityTag(String);

impl RarityTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// 取标签首个词；空标签退回默认标签
    pub fn from_label(label: &str) -> Self {
        label
            .split_whitespace()
            .next()
            .or_else(|| DEFAULT_RARITY_LABEL.split_whitespace().next())
            .map(Self::new)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RarityTag {
    fn default() -> Self {
        Self::new("🟢")
    }
}

impl fmt::Display for RarityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaritySetting {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// 未设置时使用配置里的默认权重
    #[serde(default, alias = "chance")]
    pub weight: Option<f64>,
}

impl RaritySetting {
    pub fn enabled(weight: f64) -> Self {
        Self {
            enabled: true,
            weight: Some(weight),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            weight: None,
        }
    }
}

/// 全局稀有度策略，遍历顺序即加入加权列表的顺序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalRarityPolicy {
    rarities: IndexMap<RarityTag, RaritySetting>,
}

impl GlobalRarityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tag: impl Into<String>, setting: RaritySetting) -> Self {
        self.insert(RarityTag::new(tag), setting);
        self
    }

    pub fn insert(&mut self, tag: RarityTag, setting: RaritySetting) {
        self.rarities.insert(tag, setting);
    }

    pub fn get(&self, tag: &RarityTag) -> Option<&RaritySetting> {
        self.rarities.get(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RarityTag, &RaritySetting)> {
        self.rarities.iter()
    }

    /// 只有显式关闭的稀有度才算禁用，未列出的视为开启
    pub fn is_disabled(&self, tag: &RarityTag) -> bool {
        self.rarities.get(tag).map_or(false, |s| !s.enabled)
    }
}

/// 群专属稀有度：该稀有度只在这个群刷新
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusiveGrant {
    pub chat_id: ChatId,
    pub tag: RarityTag,
    #[serde(default, alias = "chance")]
    pub weight: Option<f64>,
}

impl ExclusiveGrant {
    pub fn new(chat_id: ChatId, tag: impl Into<String>, weight: Option<f64>) -> Self {
        Self {
            chat_id,
            tag: RarityTag::new(tag),
            weight,
        }
    }
}
