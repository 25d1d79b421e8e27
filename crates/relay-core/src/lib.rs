//! Core of the channel broadcast relay.
//!
//! Framework-agnostic: the channel registry, the broadcast fan-out engine, and the
//! ports (traits) that a chat transport adapter implements.

pub mod broadcast;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod payload;
pub mod registry;
pub mod security;
pub mod transport;
pub mod utils;

pub use errors::{Error, Result};
