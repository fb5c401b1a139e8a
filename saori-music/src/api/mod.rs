//! HTTP control API
//!
//! REST endpoints for playlist management and playback control, plus an
//! SSE stream of playback events.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{build_router, run, AppContext};
