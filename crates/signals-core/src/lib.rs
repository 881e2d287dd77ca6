//! ============================================================================
//! SIGNALS-CORE: Session & Live Feed Client Core
//! ============================================================================
//! This crate handles all backend logic for the signals client:
//! - Authenticated request client with transparent single-flight token refresh
//! - Persistent signal stream with reconnection and arrival-order delivery
//! - Subscription-tier gating of premium signals
//! - Secure token storage (keyring) and local prefs (redb)
//! ============================================================================

pub mod access;
pub mod api;
pub mod error;
pub mod prefs;
pub mod session;
pub mod stream;
pub mod token_store;

// Re-export main types for convenience
pub use access::{gate, RenderDecision, SignalTier, SubscriptionTier};
pub use api::{paths, ApiClient, ApiConfig};
pub use error::{ApiError, StoreError, StreamError};
pub use prefs::PrefsDb;
pub use session::SessionSnapshot;
pub use stream::{
    ConnectionState, FeedBuffer, FeedEntry, LifecycleStatus, Signal, SignalStreamManager,
    StreamConfig, StreamEvent,
};
pub use token_store::{KeyringTokenStore, MemoryTokenStore, TokenPair, TokenStore};
