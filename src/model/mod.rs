// 数据模型 - 角色、稀有度、聊天与用户

pub mod character;
pub mod chat;
pub mod rarity;

pub use character::{Character, CharacterId, Media};
pub use chat::{ChatId, ChatInfo, ChatKind, InboundMessage, MessageHandle, UserId, UserInfo};
pub use rarity::{
    ExclusiveGrant, GlobalRarityPolicy, RaritySetting, RarityTag, DEFAULT_RARITY_LABEL,
    VIDEO_RARITY_TAG,
};
