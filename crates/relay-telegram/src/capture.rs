//! Capture an incoming operator message as a core `Payload`.

use teloxide::types::Message;

use relay_core::{
    payload::{FormattedText, MediaKind, Payload},
    Result,
};

use crate::entities_to_raw;

/// Build the payload to relay from the operator's message.
///
/// Media keeps its caption with the caption's entities; text keeps the body's
/// entities. Anything without a dedicated send primitive becomes `Unsupported`.
/// Fails rather than relay a message with some of its formatting missing.
pub fn payload_from_message(msg: &Message) -> Result<Payload> {
    let caption = match msg.caption() {
        Some(c) => Some(FormattedText::new(
            c,
            entities_to_raw(msg.caption_entities().unwrap_or_default())?,
        )),
        None => None,
    };

    if let Some((kind, file_id)) = media_of(msg) {
        return Ok(Payload::media(kind, file_id, caption));
    }

    if let Some(text) = msg.text() {
        return Ok(Payload::Text(FormattedText::new(
            text,
            entities_to_raw(msg.entities().unwrap_or_default())?,
        )));
    }

    Ok(Payload::Unsupported { caption })
}

fn media_of(msg: &Message) -> Option<(MediaKind, String)> {
    if let Some(sizes) = msg.photo() {
        // Largest size is last.
        return sizes
            .last()
            .map(|p| (MediaKind::Photo, p.file.id.clone()));
    }
    if let Some(a) = msg.animation() {
        return Some((MediaKind::Animation, a.file.id.clone()));
    }
    if let Some(v) = msg.video() {
        return Some((MediaKind::Video, v.file.id.clone()));
    }
    if let Some(d) = msg.document() {
        return Some((MediaKind::Document, d.file.id.clone()));
    }
    if let Some(a) = msg.audio() {
        return Some((MediaKind::Audio, a.file.id.clone()));
    }
    if let Some(v) = msg.voice() {
        return Some((MediaKind::Voice, v.file.id.clone()));
    }
    if let Some(v) = msg.video_note() {
        return Some((MediaKind::VideoNote, v.file.id.clone()));
    }
    if let Some(s) = msg.sticker() {
        return Some((MediaKind::Sticker, s.file.id.clone()));
    }
    None
}
