use crate::{formatting::truncate_chars, registry::Destination};

/// Inline keyboard (buttons) attached to an operator reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Callback actions encoded into button data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Remove(i64),
    ClearConfirm,
    ClearCancel,
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        match self {
            CallbackAction::Remove(id) => format!("remove:{id}"),
            CallbackAction::ClearConfirm => "clear:yes".to_string(),
            CallbackAction::ClearCancel => "clear:no".to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "clear:yes" => Some(CallbackAction::ClearConfirm),
            "clear:no" => Some(CallbackAction::ClearCancel),
            _ => data
                .strip_prefix("remove:")
                .and_then(|id| id.parse::<i64>().ok())
                .map(CallbackAction::Remove),
        }
    }
}

impl InlineKeyboard {
    /// One "remove" button per registered channel.
    pub fn channel_picker(destinations: &[Destination], max_label_len: usize) -> Self {
        let rows = destinations
            .iter()
            .enumerate()
            .map(|(idx, d)| {
                vec![InlineButton::new(
                    format!("{}. {}", idx + 1, truncate_chars(&d.display_name, max_label_len)),
                    CallbackAction::Remove(d.id.0).encode(),
                )]
            })
            .collect();
        Self { rows }
    }

    /// Yes/No confirmation for clearing the whole registry.
    pub fn clear_confirmation() -> Self {
        Self {
            rows: vec![vec![
                InlineButton::new("✅ Yes, clear all", CallbackAction::ClearConfirm.encode()),
                InlineButton::new("❌ No, keep them", CallbackAction::ClearCancel.encode()),
            ]],
        }
    }
}
