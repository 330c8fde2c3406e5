//! HTTP API handlers
//!
//! Each submodule exposes its handlers plus a `*_routes()` builder merged by
//! `crate::build_router`.

pub mod analysis;
pub mod channel;
pub mod status;
pub mod upload;

pub use analysis::analysis_routes;
pub use channel::channel_routes;
pub use status::status_routes;
pub use upload::upload_routes;
