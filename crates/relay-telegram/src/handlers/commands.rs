use teloxide::prelude::ResponseResult;

use relay_core::{
    domain::{ChatId, UserId},
    formatting::escape_html,
    messaging::types::InlineKeyboard,
    utils::AuditEvent,
};

use super::{broadcast, report, OperatorContext};

const PICKER_LABEL_MAX: usize = 40;

/// Split `/cmd@botname rest...` into (`cmd`, `rest`).
pub(crate) fn parse_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// Canonical command name, folding the long-form aliases.
fn canonical(cmd: &str) -> &str {
    match cmd {
        "add_channel" => "add",
        "remove_channel" => "remove",
        "list_channels" => "list",
        "clear_channels" => "clear",
        "help" => "start",
        other => other,
    }
}

pub(crate) async fn handle_command(ctx: OperatorContext, cmd: &str, arg: &str) -> ResponseResult<()> {
    match canonical(cmd) {
        "start" => handle_start(&ctx).await,
        "add" => handle_add(&ctx, arg).await,
        "remove" => handle_remove(&ctx, arg).await,
        "list" => handle_list(&ctx).await,
        "clear" => handle_clear(&ctx).await,
        "stats" => handle_stats(&ctx).await,
        "test" => broadcast::handle_test(ctx).await,
        _ => {
            reply(
                &ctx,
                &format!(
                    "Unknown command: /{}\nUse /help to see available commands.",
                    escape_html(cmd)
                ),
            )
            .await;
            Ok(())
        }
    }
}

async fn reply(ctx: &OperatorContext, html: &str) {
    if let Err(e) = ctx
        .state
        .messenger
        .send_html(ChatId(ctx.chat_id), html)
        .await
    {
        tracing::warn!(error = %e, "failed to reply to operator");
    }
}

fn help_text(bot_username: &str) -> String {
    format!(
        "📢 <b>Channel Broadcast Bot</b> (@{})\n\n\
<b>Channel Management:</b>\n\
/add <code>@channel</code> or <code>-100...</code> - Add a channel\n\
/remove - Remove a channel\n\
/list - List all channels\n\
/clear - Remove ALL channels\n\n\
<b>Broadcasting:</b>\n\
Send any message (text, photo, video, document, audio, voice, sticker) and it will be forwarded to all channels.\n\n\
<b>Other:</b>\n\
/test - Send a test message to all channels\n\
/stats - Show statistics\n\
/myid - Show your Telegram user id\n\n\
<i>The bot must be an administrator in every channel it posts to.</i>",
        escape_html(bot_username)
    )
}

async fn handle_start(ctx: &OperatorContext) -> ResponseResult<()> {
    reply(ctx, &help_text(&ctx.state.bot_username)).await;
    Ok(())
}

async fn handle_add(ctx: &OperatorContext, arg: &str) -> ResponseResult<()> {
    if arg.is_empty() {
        reply(
            ctx,
            "❌ Please provide a channel ID or username.\n\n\
<b>Examples:</b>\n\
<code>/add @mychannel</code>\n\
<code>/add -1001234567890</code>\n\
<code>/add https://t.me/mychannel</code>",
        )
        .await;
        return Ok(());
    }

    let status = ctx
        .state
        .messenger
        .send_html(ChatId(ctx.chat_id), "🔍 Checking channel...")
        .await
        .ok();

    let html = match ctx
        .state
        .broadcaster
        .add_destination(arg, UserId(ctx.user_id))
        .await
    {
        Ok(dest) => {
            ctx.state
                .audit
                .record(AuditEvent::channel_add(ctx.user_id, &ctx.username, &dest));
            tracing::info!(chat_id = dest.id.0, channel = %dest.display_name, "channel added");
            report::render_added(&dest, ctx.state.broadcaster.count().await)
        }
        Err(e) => {
            ctx.state.audit.record(AuditEvent::error(
                ctx.user_id,
                &ctx.username,
                &e.to_string(),
                Some(&format!("add {arg}")),
            ));
            tracing::info!(input = %arg, error = %e, "channel add rejected");
            report::render_registry_error(&e)
        }
    };

    match status {
        Some(msg) => {
            if let Err(e) = ctx.state.messenger.edit_html(msg, &html).await {
                tracing::warn!(error = %e, "failed to edit add status");
                reply(ctx, &html).await;
            }
        }
        None => reply(ctx, &html).await,
    }
    Ok(())
}

async fn handle_remove(ctx: &OperatorContext, arg: &str) -> ResponseResult<()> {
    let broadcaster = &ctx.state.broadcaster;

    if arg.is_empty() {
        let destinations = broadcaster.list_destinations().await;
        if destinations.is_empty() {
            reply(ctx, "📭 No channels to remove.").await;
            return Ok(());
        }
        let keyboard = InlineKeyboard::channel_picker(&destinations, PICKER_LABEL_MAX);
        if let Err(e) = ctx
            .state
            .messenger
            .send_inline_keyboard(
                ChatId(ctx.chat_id),
                "🗑 <b>Select a channel to remove:</b>",
                keyboard,
            )
            .await
        {
            tracing::warn!(error = %e, "failed to send remove keyboard");
        }
        return Ok(());
    }

    match broadcaster.remove_destination(arg).await {
        Ok(dest) => {
            ctx.state
                .audit
                .record(AuditEvent::channel_remove(ctx.user_id, &ctx.username, &dest));
            tracing::info!(chat_id = dest.id.0, channel = %dest.display_name, "channel removed");
            reply(ctx, &report::render_removed(&dest, broadcaster.count().await)).await;
        }
        Err(e) => reply(ctx, &report::render_registry_error(&e)).await,
    }
    Ok(())
}

async fn handle_list(ctx: &OperatorContext) -> ResponseResult<()> {
    let destinations = ctx.state.broadcaster.list_destinations().await;
    if destinations.is_empty() {
        reply(
            ctx,
            "📭 No channels added yet.\n\nUse <code>/add @channel</code> to add one.",
        )
        .await;
        return Ok(());
    }

    for chunk in report::render_channel_list(&destinations, ctx.state.cfg.telegram_safe_limit) {
        reply(ctx, &chunk).await;
    }
    Ok(())
}

async fn handle_clear(ctx: &OperatorContext) -> ResponseResult<()> {
    let count = ctx.state.broadcaster.count().await;
    if count == 0 {
        reply(ctx, "📭 No channels to clear.").await;
        return Ok(());
    }

    let prompt = format!(
        "⚠️ <b>Are you sure?</b>\n\nThis will remove all <b>{count}</b> channels from the broadcast list."
    );
    if let Err(e) = ctx
        .state
        .messenger
        .send_inline_keyboard(
            ChatId(ctx.chat_id),
            &prompt,
            InlineKeyboard::clear_confirmation(),
        )
        .await
    {
        tracing::warn!(error = %e, "failed to send clear confirmation");
    }
    Ok(())
}

async fn handle_stats(ctx: &OperatorContext) -> ResponseResult<()> {
    let destinations = ctx.state.broadcaster.list_destinations().await;
    let with_handle = destinations.iter().filter(|d| d.handle.is_some()).count();
    let html = format!(
        "📊 <b>Bot Statistics</b>\n\n\
📢 Total channels: {}\n\
🔗 Public (with username): {}\n\
🔒 Private (id only): {}\n\
👤 Operator ID: <code>{}</code>",
        destinations.len(),
        with_handle,
        destinations.len() - with_handle,
        ctx.state.cfg.owner_id.0,
    );
    reply(ctx, &html).await;
    Ok(())
}
