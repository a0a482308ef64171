// 角色数据

use serde::{Deserialize, Serialize};
use std::fmt;

use super::rarity::{RarityTag, DEFAULT_RARITY_LABEL};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub String);

impl CharacterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn default_rarity_label() -> String {
    DEFAULT_RARITY_LABEL.to_string()
}

/// 角色库中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub anime: String,
    #[serde(default = "default_rarity_label", rename = "rarity")]
    pub rarity_label: String,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub removed: bool,
    #[serde(rename = "img_url")]
    pub media_ref: String,
}

impl Character {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        anime: impl Into<String>,
        rarity_label: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            media_ref: format!("https://media.invalid/{}.jpg", id),
            id: CharacterId(id),
            name: name.into(),
            anime: anime.into(),
            rarity_label: rarity_label.into(),
            is_video: false,
            removed: false,
        }
    }

    pub fn as_video(mut self) -> Self {
        self.is_video = true;
        self
    }

    pub fn as_removed(mut self) -> Self {
        self.removed = true;
        self
    }

    pub fn rarity_tag(&self) -> RarityTag {
        RarityTag::from_label(&self.rarity_label)
    }

    pub fn media(&self) -> Media {
        if self.is_video {
            Media::Video(self.media_ref.clone())
        } else {
            Media::Photo(self.media_ref.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "lowercase")]
pub enum Media {
    Photo(String),
    Video(String),
}
