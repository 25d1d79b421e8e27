use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};

use relay_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::types::CallbackAction,
    security::is_authorized,
    utils::AuditEvent,
};

use crate::router::AppState;

use super::report;

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let user_id = q.from.id.0 as i64;
    let username = q
        .from
        .username
        .clone()
        .unwrap_or_else(|| "unknown".to_string());
    let origin = q.message.as_ref().map(|m| MessageRef {
        chat_id: ChatId(m.chat.id.0),
        message_id: MessageId(m.id.0),
    });
    let action = q.data.as_deref().and_then(CallbackAction::parse);

    let messenger = state.messenger.clone();

    if !is_authorized(Some(UserId(user_id)), state.cfg.owner_id) {
        state.audit.record(AuditEvent::auth(user_id, &username, false));
        let _ = messenger
            .answer_callback_query(&cb_id, Some("Unauthorized"))
            .await;
        return Ok(());
    }

    let (Some(origin), Some(action)) = (origin, action) else {
        let _ = messenger.answer_callback_query(&cb_id, None).await;
        return Ok(());
    };

    let broadcaster = &state.broadcaster;
    let (toast, html) = match action {
        CallbackAction::Remove(id) => match broadcaster.remove_by_id(ChatId(id)).await {
            Ok(dest) => {
                state
                    .audit
                    .record(AuditEvent::channel_remove(user_id, &username, &dest));
                tracing::info!(chat_id = dest.id.0, channel = %dest.display_name, "channel removed");
                (
                    "Removed",
                    report::render_removed(&dest, broadcaster.count().await),
                )
            }
            Err(e) => ("Not found", report::render_registry_error(&e)),
        },
        CallbackAction::ClearConfirm => {
            let removed = broadcaster.clear_all().await;
            state
                .audit
                .record(AuditEvent::channel_clear(user_id, &username, removed));
            tracing::info!(removed, "channel registry cleared");
            (
                "Cleared",
                format!("🗑 Cleared <b>{removed}</b> channels from the broadcast list."),
            )
        }
        CallbackAction::ClearCancel => ("Cancelled", "❎ Cancelled. No channels were removed.".to_string()),
    };

    let _ = messenger.answer_callback_query(&cb_id, Some(toast)).await;
    if let Err(e) = messenger.edit_html(origin, &html).await {
        tracing::warn!(error = %e, "failed to edit callback message");
    }
    Ok(())
}
