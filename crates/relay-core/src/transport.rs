use std::fmt;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, UserId},
    payload::{FormattedText, MediaKind},
    Result,
};

/// How the operator referred to a destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatIdentifier {
    Id(ChatId),
    /// Public alias, stored without the leading `@`.
    Username(String),
}

impl ChatIdentifier {
    /// Parse an operator token: `-1001234567890`, `@news`, `news` or `t.me/news`.
    pub fn parse(token: &str) -> std::result::Result<Self, String> {
        let t = token.trim();
        if t.is_empty() {
            return Err("empty chat identifier".to_string());
        }

        if let Some(rest) = t.strip_prefix('@') {
            return username(rest);
        }

        for prefix in ["https://t.me/", "http://t.me/", "t.me/"] {
            if let Some(rest) = t.strip_prefix(prefix) {
                return username(rest.trim_end_matches('/'));
            }
        }

        if t.starts_with('-') || t.starts_with(|c: char| c.is_ascii_digit()) {
            return t
                .parse::<i64>()
                .map(|id| ChatIdentifier::Id(ChatId(id)))
                .map_err(|_| format!("malformed chat id: {t}"));
        }

        username(t)
    }
}

fn username(raw: &str) -> std::result::Result<ChatIdentifier, String> {
    let valid = raw.starts_with(|c: char| c.is_ascii_alphabetic())
        && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(format!("invalid channel username: {raw}"));
    }
    Ok(ChatIdentifier::Username(raw.to_string()))
}

impl fmt::Display for ChatIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatIdentifier::Id(id) => write!(f, "{id}"),
            ChatIdentifier::Username(name) => write!(f, "@{name}"),
        }
    }
}

/// Chat metadata as resolved by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMeta {
    pub id: ChatId,
    pub title: String,
    pub username: Option<String>,
}

/// The bot's membership role in a chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Owner,
    Administrator,
    Member,
    None,
}

impl Role {
    pub fn can_post(self) -> bool {
        matches!(self, Role::Owner | Role::Administrator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Owner => "owner",
            Role::Administrator => "administrator",
            Role::Member => "member",
            Role::None => "not a member",
        };
        f.write_str(s)
    }
}

/// Chat transport used to verify and reach destinations.
///
/// Every call may suspend on a network round trip; errors carry the transport's
/// own diagnostic text (e.g. "chat not found", "bot was blocked").
#[async_trait]
pub trait Transport: Send + Sync {
    /// The bot's own user id (used for membership checks).
    fn self_id(&self) -> UserId;

    async fn resolve_chat(&self, ident: &ChatIdentifier) -> Result<ChatMeta>;

    async fn membership_role(&self, chat_id: ChatId, user_id: UserId) -> Result<Role>;

    async fn send_text(&self, chat_id: ChatId, text: &FormattedText) -> Result<()>;

    async fn send_media(
        &self,
        chat_id: ChatId,
        kind: MediaKind,
        file_id: &str,
        caption: Option<&FormattedText>,
    ) -> Result<()>;
}
