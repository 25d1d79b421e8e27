//! Telegram update handlers.
//!
//! Every update is checked against the single operator identity. Commands manage the
//! channel registry; any other operator message is relayed to all channels.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message, ParseMode},
};

use relay_core::{domain::UserId, security::is_authorized, utils::AuditEvent};

use crate::router::AppState;

mod broadcast;
mod callback;
mod commands;
mod report;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;
    let username = user
        .username
        .clone()
        .unwrap_or_else(|| "unknown".to_string());

    let command = msg
        .text()
        .filter(|t| t.starts_with('/'))
        .map(commands::parse_command);

    // `/myid` is answered for anyone so a new operator can find their id.
    if let Some((cmd, _)) = &command {
        if cmd == "myid" {
            let _ = bot
                .send_message(
                    msg.chat.id,
                    format!("Your Telegram User ID: <code>{user_id}</code>"),
                )
                .parse_mode(ParseMode::Html)
                .await;
            return Ok(());
        }
    }

    if !is_authorized(Some(UserId(user_id)), state.cfg.owner_id) {
        state
            .audit
            .record(AuditEvent::auth(user_id, &username, false));
        tracing::info!(user_id, username = %username, "rejected unauthorized user");
        let _ = bot
            .send_message(
                msg.chat.id,
                format!(
                    "⛔ You are not authorized to use this bot.\nYour User ID: <code>{user_id}</code>"
                ),
            )
            .parse_mode(ParseMode::Html)
            .await;
        return Ok(());
    }

    let ctx = OperatorContext {
        state,
        chat_id: msg.chat.id.0,
        user_id,
        username,
    };

    match command {
        Some((cmd, arg)) => commands::handle_command(ctx, &cmd, &arg).await,
        None => broadcast::handle_broadcast(ctx, &msg).await,
    }
}

/// The authorized operator and the chat they are talking to the bot from.
#[derive(Clone)]
pub(crate) struct OperatorContext {
    pub state: Arc<AppState>,
    pub chat_id: i64,
    pub user_id: i64,
    pub username: String,
}
