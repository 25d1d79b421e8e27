//! In-memory channel registry.
//!
//! Destinations are kept in insertion order and unique by chat id. The registry is
//! volatile: it lives for the process lifetime and is shared by `Arc`.

use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    domain::{ChatId, UserId},
    transport::{ChatIdentifier, ChatMeta, Role},
};

/// A registered broadcast target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub id: ChatId,
    pub display_name: String,
    /// Public alias without the leading `@`.
    pub handle: Option<String>,
    pub registered_by: UserId,
    pub registered_at: DateTime<Utc>,
}

impl Destination {
    /// `@handle` if the chat has one.
    pub fn handle_label(&self) -> Option<String> {
        self.handle.as_ref().map(|h| format!("@{h}"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("could not resolve chat: {0}")]
    Resolution(String),

    #[error("bot is not an admin in {title} (role: {role})")]
    NotAdmin { title: String, role: Role },

    #[error("{title} ({id}) is already registered")]
    AlreadyRegistered { id: ChatId, title: String },

    #[error("no registered channel matches {0}")]
    NotFound(String),
}

/// Result of the admission check performed before a destination is added.
#[derive(Clone, Debug)]
pub struct Verification {
    pub meta: ChatMeta,
    pub role: Role,
}

#[derive(Debug, Default)]
pub struct ChannelRegistry {
    entries: RwLock<Vec<Destination>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify and register a destination.
    ///
    /// `verify` resolves the identifier and reports the bot's role in the chat. It
    /// runs without holding the registry lock; the duplicate check and the append
    /// happen atomically afterwards.
    pub async fn add<F, Fut>(
        &self,
        identifier: &str,
        registered_by: UserId,
        verify: F,
    ) -> Result<Destination, RegistryError>
    where
        F: FnOnce(ChatIdentifier) -> Fut,
        Fut: Future<Output = Result<Verification, RegistryError>>,
    {
        let ident = ChatIdentifier::parse(identifier).map_err(RegistryError::Resolution)?;
        let Verification { meta, role } = verify(ident).await?;

        if !role.can_post() {
            return Err(RegistryError::NotAdmin {
                title: meta.title,
                role,
            });
        }

        let mut entries = self.entries.write().await;
        if entries.iter().any(|d| d.id == meta.id) {
            return Err(RegistryError::AlreadyRegistered {
                id: meta.id,
                title: meta.title,
            });
        }

        let dest = Destination {
            id: meta.id,
            display_name: meta.title,
            handle: meta
                .username
                .map(|u| u.trim_start_matches('@').to_string())
                .filter(|u| !u.is_empty()),
            registered_by,
            registered_at: Utc::now(),
        };
        entries.push(dest.clone());
        Ok(dest)
    }

    pub async fn remove(&self, id: ChatId) -> Result<Destination, RegistryError> {
        let mut entries = self.entries.write().await;
        let Some(idx) = entries.iter().position(|d| d.id == id) else {
            return Err(RegistryError::NotFound(id.to_string()));
        };
        Ok(entries.remove(idx))
    }

    /// Remove by chat id (string compared) or, failing that, by handle with any
    /// leading `@` stripped. Handles compare case-insensitively, as Telegram usernames do.
    pub async fn remove_by_handle_or_id(&self, token: &str) -> Result<Destination, RegistryError> {
        let token = token.trim();
        let alias = token.trim_start_matches('@');

        let mut entries = self.entries.write().await;
        let idx = entries
            .iter()
            .position(|d| d.id.to_string() == token)
            .or_else(|| {
                entries
                    .iter()
                    .position(|d| {
                        !alias.is_empty()
                            && d.handle
                                .as_deref()
                                .is_some_and(|h| h.eq_ignore_ascii_case(alias))
                    })
            });

        match idx {
            Some(i) => Ok(entries.remove(i)),
            None => Err(RegistryError::NotFound(token.to_string())),
        }
    }

    /// Drop every destination and return how many there were.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let n = entries.len();
        entries.clear();
        n
    }

    /// Ordered snapshot of the registry.
    pub async fn list(&self) -> Vec<Destination> {
        self.entries.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}
