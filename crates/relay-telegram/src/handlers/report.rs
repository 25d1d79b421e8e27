//! Operator-facing HTML rendering for registry results and broadcast reports.

use relay_core::{
    broadcast::BroadcastReport,
    formatting::{escape_html, plural, truncate_chars},
    registry::{Destination, RegistryError},
};

const ERROR_DETAIL_MAX: usize = 200;

pub const NO_CHANNELS: &str =
    "❌ No channels configured!\n\nUse <code>/add @channel</code> to add one first.";

pub fn render_report(title: &str, report: &BroadcastReport, failure_limit: usize) -> String {
    let mut out = format!(
        "<b>{}</b>\n\n✅ Sent: {}/{}",
        escape_html(title),
        report.succeeded,
        report.total
    );
    if report.all_succeeded() {
        return out;
    }

    out.push_str(&format!("\n❌ Failed: {}\n\n<b>Errors:</b>", report.failed));
    let (shown, more) = report.failure_preview(failure_limit);
    for f in shown {
        let detail = f.error.as_deref().unwrap_or("unknown error");
        out.push_str(&format!(
            "\n• {}: {}",
            escape_html(&f.display_name),
            escape_html(&truncate_chars(detail, ERROR_DETAIL_MAX))
        ));
    }
    if more > 0 {
        out.push_str(&format!("\n...and {more} more"));
    }
    out
}

/// Final status for a finished broadcast; a run with nothing to deliver to is not a report.
pub fn render_outcome(title: &str, report: &BroadcastReport, failure_limit: usize) -> String {
    if report.is_empty() {
        return NO_CHANNELS.to_string();
    }
    render_report(title, report, failure_limit)
}

pub fn render_progress(done: usize, total: usize) -> String {
    format!("📤 Broadcasting... {done}/{total}")
}

pub fn render_added(dest: &Destination, total: usize) -> String {
    format!(
        "✅ Channel <b>{}</b> has been added.\n• ID: <code>{}</code>\n• Username: {}\n• Total channels: {total}",
        escape_html(&dest.display_name),
        dest.id,
        escape_html(&dest.handle_label().unwrap_or_else(|| "N/A".to_string())),
    )
}

pub fn render_removed(dest: &Destination, remaining: usize) -> String {
    format!(
        "✅ Removed <b>{}</b> from the broadcast list.\nRemaining channels: {remaining}",
        escape_html(&dest.display_name)
    )
}

pub fn render_registry_error(err: &RegistryError) -> String {
    match err {
        RegistryError::Resolution(detail) => format!(
            "❌ Error: {}\n\nMake sure:\n1. The channel ID/username is correct\n2. The bot is added to the channel\n3. The bot is an administrator",
            escape_html(&truncate_chars(detail, ERROR_DETAIL_MAX))
        ),
        RegistryError::NotAdmin { title, role } => format!(
            "⚠️ Bot is not an admin in <b>{}</b> (role: {role}).\nAdd the bot as administrator with permission to post first.",
            escape_html(title)
        ),
        RegistryError::AlreadyRegistered { title, .. } => format!(
            "ℹ️ Channel <b>{}</b> is already in the list.",
            escape_html(title)
        ),
        RegistryError::NotFound(_) => {
            "❌ Channel not found in the list.\nUse /list to see all channels.".to_string()
        }
    }
}

/// One block per channel, each self-contained so blocks can be split across messages.
pub fn render_channel_entries(destinations: &[Destination]) -> Vec<String> {
    destinations
        .iter()
        .enumerate()
        .map(|(i, d)| {
            format!(
                "{}. <b>{}</b>\n   ID: <code>{}</code>\n   Username: {}",
                i + 1,
                escape_html(&d.display_name),
                d.id,
                escape_html(&d.handle_label().unwrap_or_else(|| "No username".to_string())),
            )
        })
        .collect()
}

pub fn render_channel_list(destinations: &[Destination], limit: usize) -> Vec<String> {
    let header = "📢 <b>Broadcast Channels:</b>".to_string();
    let footer = format!("<b>Total:</b> {}", plural(destinations.len(), "channel"));

    let mut blocks = vec![header];
    blocks.extend(render_channel_entries(destinations));
    blocks.push(footer);
    pack_blocks(&blocks, "\n\n", limit)
}

/// Greedily pack blocks into messages of at most `limit` bytes.
///
/// A single block longer than `limit` is sent on its own.
pub fn pack_blocks(blocks: &[String], sep: &str, limit: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut current = String::new();
    for block in blocks {
        if !current.is_empty() && current.len() + sep.len() + block.len() > limit {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str(sep);
        }
        current.push_str(block);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
