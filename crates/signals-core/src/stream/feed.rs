//! ============================================================================
//! Feed Buffer - Visible feed state and the de-dup boundary
//! ============================================================================
//! The stream manager keeps no long history; this buffer is where duplicate
//! ids are dropped, where the recency flag lives, and where each entry picks
//! up its render decision for the current user tier. Memory is bounded to
//! the visible feed.
//! ============================================================================

use std::collections::VecDeque;

use tracing::debug;

use super::types::{Signal, StreamEvent};
use crate::access::{gate, RenderDecision, SubscriptionTier};

/// One visible feed row.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub signal: Signal,
    /// Set on arrival, cleared when the recency window elapses.
    pub is_recent: bool,
    pub decision: RenderDecision,
}

/// Bounded, newest-first buffer of delivered signals, keyed by signal id.
pub struct FeedBuffer {
    entries: VecDeque<FeedEntry>,
    max_len: usize,
    user_tier: SubscriptionTier,
}

impl FeedBuffer {
    pub fn new(max_len: usize, user_tier: SubscriptionTier) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_len.min(64)),
            max_len: max_len.max(1),
            user_tier,
        }
    }

    /// Update the cached user tier and re-gate every entry.
    pub fn set_user_tier(&mut self, tier: SubscriptionTier) {
        if self.user_tier == tier {
            return;
        }
        self.user_tier = tier;
        for entry in &mut self.entries {
            entry.decision = gate(entry.signal.tier, tier);
        }
    }

    pub fn user_tier(&self) -> SubscriptionTier {
        self.user_tier
    }

    /// Fold a stream event into the buffer. Returns true when the visible
    /// feed changed.
    pub fn apply(&mut self, event: &StreamEvent) -> bool {
        match event {
            StreamEvent::Signal(signal) => self.push(signal.clone()),
            StreamEvent::RecencyElapsed { id } => self.clear_recent(id),
            StreamEvent::State(_) => false,
        }
    }

    fn push(&mut self, signal: Signal) -> bool {
        if self.entries.iter().any(|e| e.signal.id == signal.id) {
            debug!(id = %signal.id, "duplicate signal dropped");
            return false;
        }
        let decision = gate(signal.tier, self.user_tier);
        self.entries.push_front(FeedEntry {
            signal,
            is_recent: true,
            decision,
        });
        self.entries.truncate(self.max_len);
        true
    }

    fn clear_recent(&mut self, id: &str) -> bool {
        for entry in &mut self.entries {
            if entry.signal.id == id && entry.is_recent {
                entry.is_recent = false;
                return true;
            }
        }
        false
    }

    pub fn entries(&self) -> &VecDeque<FeedEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::SignalTier;
    use crate::stream::types::LifecycleStatus;
    use chrono::Utc;

    fn signal(id: &str, tier: SignalTier) -> Signal {
        Signal {
            id: id.to_string(),
            competition: "Serie A".to_string(),
            teams: "A x B".to_string(),
            match_clock: "12'".to_string(),
            score: "0-0".to_string(),
            action: "Over 0.5".to_string(),
            created_at: Utc::now(),
            lifecycle: LifecycleStatus::Active,
            tier,
        }
    }

    #[test]
    fn test_push_newest_first_and_dedup() {
        let mut feed = FeedBuffer::new(10, SubscriptionTier::Free);

        assert!(feed.apply(&StreamEvent::Signal(signal("s1", SignalTier::Standard))));
        assert!(feed.apply(&StreamEvent::Signal(signal("s2", SignalTier::Standard))));
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.entries()[0].signal.id, "s2");

        // Duplicate id is dropped, no visible change.
        assert!(!feed.apply(&StreamEvent::Signal(signal("s1", SignalTier::Standard))));
        assert_eq!(feed.len(), 2);
    }

    #[test]
    fn test_bounded_to_max_len() {
        let mut feed = FeedBuffer::new(3, SubscriptionTier::Free);
        for i in 0..5 {
            feed.apply(&StreamEvent::Signal(signal(
                &format!("s{}", i),
                SignalTier::Standard,
            )));
        }
        assert_eq!(feed.len(), 3);
        // Oldest entries fell off.
        assert_eq!(feed.entries()[0].signal.id, "s4");
        assert_eq!(feed.entries()[2].signal.id, "s2");
    }

    #[test]
    fn test_recency_flag_lifecycle() {
        let mut feed = FeedBuffer::new(10, SubscriptionTier::Free);
        feed.apply(&StreamEvent::Signal(signal("s1", SignalTier::Standard)));
        assert!(feed.entries()[0].is_recent);

        assert!(feed.apply(&StreamEvent::RecencyElapsed {
            id: "s1".to_string()
        }));
        assert!(!feed.entries()[0].is_recent);

        // Elapsing twice, or for an unknown id, changes nothing.
        assert!(!feed.apply(&StreamEvent::RecencyElapsed {
            id: "s1".to_string()
        }));
        assert!(!feed.apply(&StreamEvent::RecencyElapsed {
            id: "missing".to_string()
        }));
    }

    #[test]
    fn test_gating_applied_per_entry() {
        let mut feed = FeedBuffer::new(10, SubscriptionTier::Free);
        feed.apply(&StreamEvent::Signal(signal("s1", SignalTier::Standard)));
        feed.apply(&StreamEvent::Signal(signal("s2", SignalTier::Premium)));

        assert_eq!(feed.entries()[1].decision, RenderDecision::Full);
        assert_eq!(feed.entries()[0].decision, RenderDecision::LockedTeaser);
    }

    #[test]
    fn test_tier_change_regates_existing_entries() {
        let mut feed = FeedBuffer::new(10, SubscriptionTier::Free);
        feed.apply(&StreamEvent::Signal(signal("s1", SignalTier::Premium)));
        assert_eq!(feed.entries()[0].decision, RenderDecision::LockedTeaser);

        feed.set_user_tier(SubscriptionTier::Premium);
        assert_eq!(feed.entries()[0].decision, RenderDecision::Full);
    }

    #[test]
    fn test_state_events_do_not_change_feed() {
        let mut feed = FeedBuffer::new(10, SubscriptionTier::Free);
        assert!(!feed.apply(&StreamEvent::State(
            crate::stream::ConnectionState::Connected
        )));
        assert!(feed.is_empty());
    }
}
