//! ============================================================================
//! Access Types - Subscription tiers and signal tiers
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The authenticated user's paid entitlement level. Resolved from the
/// account endpoint and cached client-side; refreshed on demand by the
/// presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionTier {
    /// No paid subscription.
    #[default]
    Free,
    /// Standard plan (marketed as PRO on some endpoints).
    #[serde(alias = "PRO", alias = "pro", alias = "standard")]
    Standard,
    /// Premium plan (marketed as VIP on some endpoints).
    #[serde(alias = "VIP", alias = "vip", alias = "premium")]
    Premium,
}

impl SubscriptionTier {
    fn rank(&self) -> u8 {
        match self {
            SubscriptionTier::Free => 0,
            SubscriptionTier::Standard => 1,
            SubscriptionTier::Premium => 2,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "Free",
            SubscriptionTier::Standard => "Standard",
            SubscriptionTier::Premium => "Premium",
        }
    }
}

impl PartialOrd for SubscriptionTier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SubscriptionTier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Content tier of an individual signal (wire field `tipoEvento`).
/// Frames without a tier are treated as standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalTier {
    #[default]
    #[serde(alias = "standard")]
    Standard,
    #[serde(alias = "premium")]
    Premium,
}

/// How the presentation layer should render a signal for the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderDecision {
    /// Render the full signal content.
    Full,
    /// Render a locked teaser prompting an upgrade.
    LockedTeaser,
}
