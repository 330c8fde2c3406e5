//! # RBG Common Library
//!
//! Shared code for the RetinoblastoGemma analysis client and backends:
//! - Real-time channel frame types (`ChannelMessage`)
//! - Client event types and the `EventBus`
//! - REST request/response bodies
//! - TOML configuration loading
//! - Timestamp helpers

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
