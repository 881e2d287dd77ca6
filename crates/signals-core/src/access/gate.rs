//! ============================================================================
//! Access Gate - Pure tier-to-render-decision mapping
//! ============================================================================

use super::types::{RenderDecision, SignalTier, SubscriptionTier};

/// Decide how a signal renders for the given user tier.
///
/// Standard signals render fully for everyone; premium signals render fully
/// only for premium subscribers and as a locked teaser otherwise. No side
/// effects and no history dependence.
pub fn gate(signal_tier: SignalTier, user_tier: SubscriptionTier) -> RenderDecision {
    match signal_tier {
        SignalTier::Standard => RenderDecision::Full,
        SignalTier::Premium if user_tier == SubscriptionTier::Premium => RenderDecision::Full,
        SignalTier::Premium => RenderDecision::LockedTeaser,
    }
}
