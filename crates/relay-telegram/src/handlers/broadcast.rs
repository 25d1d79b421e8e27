use std::{sync::Arc, time::Duration};

use teloxide::{prelude::ResponseResult, types::Message};
use tokio::sync::watch;

use relay_core::{
    broadcast::{test_payload, BroadcastReport},
    domain::{ChatId, MessageRef},
    formatting::{escape_html, plural},
    messaging::port::MessagingPort,
    payload::Payload,
    utils::AuditEvent,
};

use crate::capture::payload_from_message;

use super::{report, OperatorContext};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(1500);

enum Job {
    Relay(Payload),
    Test,
}

pub(crate) async fn handle_broadcast(ctx: OperatorContext, msg: &Message) -> ResponseResult<()> {
    match payload_from_message(msg) {
        Ok(payload) => run_broadcast(ctx, Job::Relay(payload), "✅ Broadcast Complete!").await,
        Err(e) => {
            ctx.state.audit.record(AuditEvent::error(
                ctx.user_id,
                &ctx.username,
                &e.to_string(),
                Some("capture"),
            ));
            tracing::warn!(error = %e, "could not capture message for broadcast");
            let _ = ctx
                .state
                .messenger
                .send_html(
                    ChatId(ctx.chat_id),
                    &format!(
                        "❌ Could not read this message's formatting: {}",
                        escape_html(&e.detail())
                    ),
                )
                .await;
            Ok(())
        }
    }
}

pub(crate) async fn handle_test(ctx: OperatorContext) -> ResponseResult<()> {
    run_broadcast(ctx, Job::Test, "🧪 Test Results").await
}

async fn run_broadcast(ctx: OperatorContext, job: Job, title: &str) -> ResponseResult<()> {
    let state = &ctx.state;
    let chat = ChatId(ctx.chat_id);

    // One broadcast at a time; a second payload waits for the first to finish.
    let _guard = state.broadcast_lock.lock().await;

    let total = state.broadcaster.count().await;
    if total == 0 {
        let _ = state.messenger.send_html(chat, report::NO_CHANNELS).await;
        return Ok(());
    }

    let status = match state
        .messenger
        .send_html(
            chat,
            &format!("📤 Broadcasting to {}...", plural(total, "channel")),
        )
        .await
    {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %e, "failed to send broadcast status");
            None
        }
    };

    let (tx, rx) = watch::channel((0usize, total));
    let progress = status.map(|m| tokio::spawn(track_progress(state.messenger.clone(), m, rx)));
    let on_progress = move |done, total| {
        tx.send_replace((done, total));
    };

    let (payload, report) = match job {
        Job::Relay(payload) => {
            let report = state
                .broadcaster
                .broadcast_with_progress(&payload, on_progress)
                .await;
            (payload, report)
        }
        Job::Test => (test_payload(), state.broadcaster.test_broadcast(on_progress).await),
    };

    if let Some(task) = progress {
        let _ = task.await;
    }

    // The registry may have been emptied between the count and the snapshot.
    if !report.is_empty() {
        state.audit.record(AuditEvent::broadcast(
            ctx.user_id,
            &ctx.username,
            &payload,
            &report,
        ));
        tracing::info!(
            kind = payload.kind_label(),
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "broadcast finished"
        );
    }

    finish(state.messenger.as_ref(), chat, status, title, &report, state.cfg.report_failure_limit).await;
    Ok(())
}

/// Edit the status message with throttled progress until the sender side is dropped.
async fn track_progress(
    messenger: Arc<dyn MessagingPort>,
    status: MessageRef,
    mut rx: watch::Receiver<(usize, usize)>,
) {
    let mut tick = tokio::time::interval(PROGRESS_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut dirty = false;
    let mut last_shown = 0usize;

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                dirty = true;
            }
            _ = tick.tick() => {
                if !dirty {
                    continue;
                }
                dirty = false;
                let (done, total) = *rx.borrow();
                if done == last_shown || done >= total {
                    continue;
                }
                last_shown = done;
                if let Err(e) = messenger.edit_html(status, &report::render_progress(done, total)).await {
                    tracing::debug!(error = %e, "progress edit failed");
                }
            }
        }
    }
}

async fn finish(
    messenger: &dyn MessagingPort,
    chat: ChatId,
    status: Option<MessageRef>,
    title: &str,
    report: &BroadcastReport,
    failure_limit: usize,
) {
    let html = report::render_outcome(title, report, failure_limit);
    if let Some(m) = status {
        if messenger.edit_html(m, &html).await.is_ok() {
            return;
        }
    }
    if let Err(e) = messenger.send_html(chat, &html).await {
        tracing::warn!(error = %e, "failed to deliver broadcast report");
    }
}
