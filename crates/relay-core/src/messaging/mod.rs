//! Operator-facing messaging (replies, status edits, inline keyboards).

pub mod port;
pub mod types;
