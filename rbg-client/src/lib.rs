//! # rbg-client
//!
//! Client for the RetinoblastoGemma analysis backend.
//!
//! **Responsibilities:**
//! - Bind uploaded images to backend sessions and gate analysis requests
//! - Keep one progress channel open, reconnecting after loss
//! - Track backend module readiness from channel frames
//! - Drive each analysis run to a terminal state
//! - Accumulate session metrics
//!
//! **Architecture:** a single actor owns all state and applies every inbound
//! event to completion before the next; observers subscribe to `ClientEvent`s.

pub mod backend;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod readiness;
pub mod run;
pub mod session;
pub mod state;

#[cfg(test)]
mod test_support;

pub use backend::{BackendApi, HttpBackend};
pub use client::{AnalysisClient, ChannelSettings};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use session::{AcceptedRun, Artifact, Session};
pub use state::{ClientCore, ClientSnapshot};
