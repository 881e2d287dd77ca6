//! ============================================================================
//! Access Module - Subscription tiers and signal gating
//! ============================================================================
//! Maps (signal tier, user tier) to a render decision. Pure logic, no
//! network access; the user's tier is supplied by the caller from cached
//! account state.
//! ============================================================================

mod gate;
mod types;

pub use gate::gate;
pub use types::{RenderDecision, SignalTier, SubscriptionTier};
