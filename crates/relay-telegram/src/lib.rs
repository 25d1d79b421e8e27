//! Telegram adapter (teloxide).
//!
//! Implements the `relay-core` Transport (destination delivery) and MessagingPort
//! (operator replies) over the Telegram Bot API.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageEntity, ParseMode, Recipient},
    RequestError,
};

use tokio::time::sleep;

pub mod capture;
pub mod handlers;
pub mod router;

use relay_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{port::MessagingPort, types::InlineKeyboard},
    payload::{FormattedText, MediaKind},
    transport::{ChatIdentifier, ChatMeta, Role, Transport},
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    me: UserId,
}

impl TelegramMessenger {
    pub fn new(bot: Bot, me: UserId) -> Self {
        Self { bot, me }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        match e {
            // "Bad Request: chat not found", "Forbidden: bot was blocked by the user", ...
            RequestError::Api(api) => Error::External(api.to_string()),
            other => Error::External(format!("telegram error: {other}")),
        }
    }

    /// Operator replies get one retry on flood control; destination sends never retry.
    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }
}

/// Serialize Telegram entities into the opaque records carried by the core payload.
pub fn entities_to_raw(entities: &[MessageEntity]) -> Result<Vec<serde_json::Value>> {
    entities
        .iter()
        .map(|e| serde_json::to_value(e).map_err(Error::from))
        .collect()
}

/// Inverse of [`entities_to_raw`].
pub fn entities_from_raw(raw: &[serde_json::Value]) -> Result<Vec<MessageEntity>> {
    raw.iter()
        .map(|v| serde_json::from_value::<MessageEntity>(v.clone()).map_err(Error::from))
        .collect()
}

fn role_of(member: &teloxide::types::ChatMember) -> Role {
    let kind = &member.kind;
    if kind.is_owner() {
        Role::Owner
    } else if kind.is_administrator() {
        Role::Administrator
    } else if kind.is_present() {
        Role::Member
    } else {
        Role::None
    }
}

#[async_trait]
impl Transport for TelegramMessenger {
    fn self_id(&self) -> UserId {
        self.me
    }

    async fn resolve_chat(&self, ident: &ChatIdentifier) -> Result<ChatMeta> {
        let recipient = match ident {
            ChatIdentifier::Id(id) => Recipient::Id(Self::tg_chat(*id)),
            ChatIdentifier::Username(name) => Recipient::ChannelUsername(format!("@{name}")),
        };
        let chat = self.bot.get_chat(recipient).await.map_err(Self::map_err)?;

        let title = chat
            .title()
            .or_else(|| chat.first_name())
            .or_else(|| chat.username())
            .map(|s| s.to_string())
            .unwrap_or_else(|| chat.id.0.to_string());

        Ok(ChatMeta {
            id: ChatId(chat.id.0),
            title,
            username: chat.username().map(|s| s.to_string()),
        })
    }

    async fn membership_role(&self, chat_id: ChatId, user_id: UserId) -> Result<Role> {
        let member = self
            .bot
            .get_chat_member(Self::tg_chat(chat_id), teloxide::types::UserId(user_id.0 as u64))
            .await
            .map_err(Self::map_err)?;
        Ok(role_of(&member))
    }

    async fn send_text(&self, chat_id: ChatId, text: &FormattedText) -> Result<()> {
        let entities = entities_from_raw(&text.entities)?;
        let mut req = self
            .bot
            .send_message(Self::tg_chat(chat_id), text.text.clone());
        if !entities.is_empty() {
            req = req.entities(entities);
        }
        req.await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_media(
        &self,
        chat_id: ChatId,
        kind: MediaKind,
        file_id: &str,
        caption: Option<&FormattedText>,
    ) -> Result<()> {
        let chat = Self::tg_chat(chat_id);
        let file = InputFile::file_id(file_id.to_string());
        let (text, entities) = match caption {
            Some(c) => (Some(c.text.clone()), entities_from_raw(&c.entities)?),
            None => (None, Vec::new()),
        };

        // Each arm applies the caption (and its own entities) only where the API accepts one.
        macro_rules! with_caption {
            ($req:expr) => {{
                let mut req = $req;
                if let Some(text) = text {
                    req = req.caption(text);
                    if !entities.is_empty() {
                        req = req.caption_entities(entities);
                    }
                }
                req.await.map_err(Self::map_err)?;
            }};
        }

        match kind {
            MediaKind::Photo => with_caption!(self.bot.send_photo(chat, file)),
            MediaKind::Video => with_caption!(self.bot.send_video(chat, file)),
            MediaKind::Document => with_caption!(self.bot.send_document(chat, file)),
            MediaKind::Audio => with_caption!(self.bot.send_audio(chat, file)),
            MediaKind::Voice => with_caption!(self.bot.send_voice(chat, file)),
            MediaKind::Animation => with_caption!(self.bot.send_animation(chat, file)),
            MediaKind::VideoNote => {
                self.bot
                    .send_video_note(chat, file)
                    .await
                    .map_err(Self::map_err)?;
            }
            MediaKind::Sticker => {
                self.bot
                    .send_sticker(chat, file)
                    .await
                    .map_err(Self::map_err)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|b| InlineKeyboardButton::callback(b.label, b.callback_data))
                    .collect()
            })
            .collect();
        let markup = InlineKeyboardMarkup::new(rows);

        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}
