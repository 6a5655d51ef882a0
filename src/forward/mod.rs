//! Forwarding dispatch: send units, collect correlated replies

pub mod channel;
pub mod engine;

pub use channel::{BackendChannel, ChannelGuard, ChannelProvider};
pub use engine::ForwardEngine;
