//! ============================================================================
//! Stream Module - Live signal feed
//! ============================================================================
//! Owns the persistent pub/sub connection: reconnection with fixed back-off,
//! arrival-order delivery, recency timers, and the visible-feed buffer that
//! acts as the de-dup boundary for the presentation layer.
//! ============================================================================

mod feed;
mod manager;
mod types;

pub use feed::{FeedBuffer, FeedEntry};
pub use manager::{SignalStreamManager, StreamConfig};
pub use types::{ConnectionState, LifecycleStatus, Signal, StreamEvent};
