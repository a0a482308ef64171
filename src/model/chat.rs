// 聊天与用户标识

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// 聊天内的消息编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHandle(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// 只有群组消息参与刷新计数
    pub fn is_group(self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: ChatId,
    pub kind: ChatKind,
    /// 群名称
    pub title: Option<String>,
    /// 公开群的用户名
    pub username: Option<String>,
}

impl ChatInfo {
    pub fn supergroup(id: i64, title: impl Into<String>) -> Self {
        Self {
            id: ChatId(id),
            kind: ChatKind::Supergroup,
            title: Some(title.into()),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// 可分享的消息链接：公开群用用户名，私有群用去掉 -100 前缀的内部编号
    pub fn permalink(&self, message: MessageHandle) -> String {
        match self.username.as_deref().filter(|u| !u.is_empty()) {
            Some(username) => format!("https://t.me/{}/{}", username, message),
            None => {
                let raw = self.id.0.to_string();
                let internal = raw.strip_prefix("-100").unwrap_or(raw.as_str());
                format!("https://t.me/c/{}/{}", internal, message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: String,
}

impl UserInfo {
    pub fn new(id: i64, first_name: impl Into<String>) -> Self {
        Self {
            id: UserId(id),
            username: None,
            first_name: first_name.into(),
        }
    }
}

/// 入站的普通聊天消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat: ChatInfo,
    pub sender: Option<UserInfo>,
}

impl InboundMessage {
    pub fn new(chat: ChatInfo, sender: Option<UserInfo>) -> Self {
        Self { chat, sender }
    }
}
