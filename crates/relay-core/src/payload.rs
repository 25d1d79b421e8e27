//! The single outbound item relayed to every destination.

/// Text (or caption) plus its rich-text formatting spans.
///
/// Entities are kept as the transport's own serialized records so the relayed copy
/// carries them verbatim; the core never interprets offsets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormattedText {
    pub text: String,
    pub entities: Vec<serde_json::Value>,
}

impl FormattedText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entities: Vec::new(),
        }
    }

    pub fn new(text: impl Into<String>, entities: Vec<serde_json::Value>) -> Self {
        Self {
            text: text.into(),
            entities,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Media kinds with a dedicated send primitive on the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    VideoNote,
    Sticker,
    Animation,
}

impl MediaKind {
    /// Video notes and stickers cannot carry a caption.
    pub fn accepts_caption(self) -> bool {
        !matches!(self, MediaKind::VideoNote | MediaKind::Sticker)
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
            MediaKind::Voice => "voice",
            MediaKind::VideoNote => "video_note",
            MediaKind::Sticker => "sticker",
            MediaKind::Animation => "animation",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MediaItem {
    pub kind: MediaKind,
    /// Transport-side reference to already uploaded content (Telegram `file_id`).
    pub file_id: String,
    pub caption: Option<FormattedText>,
}

/// Immutable payload captured from the operator's message.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Text(FormattedText),
    Media(MediaItem),
    /// A message kind with no dedicated send primitive.
    Unsupported { caption: Option<FormattedText> },
}

/// Sent in place of an unsupported payload that has no caption of its own.
pub const FALLBACK_PLACEHOLDER: &str = "📢 Broadcast";

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text(FormattedText::plain(text))
    }

    pub fn media(kind: MediaKind, file_id: impl Into<String>, caption: Option<FormattedText>) -> Self {
        Payload::Media(MediaItem {
            kind,
            file_id: file_id.into(),
            caption,
        })
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Media(m) => m.kind.label(),
            Payload::Unsupported { .. } => "unsupported",
        }
    }

    /// Short human preview of the body (for audit/status lines).
    pub fn preview(&self) -> Option<&str> {
        match self {
            Payload::Text(t) => Some(t.text.as_str()),
            Payload::Media(m) => m.caption.as_ref().map(|c| c.text.as_str()),
            Payload::Unsupported { caption } => caption.as_ref().map(|c| c.text.as_str()),
        }
    }
}
