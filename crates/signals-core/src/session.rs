//! ============================================================================
//! Session - Mutable authentication state owned by the request client
//! ============================================================================
//! Exactly one `Session` exists per `ApiClient`. Created empty at startup,
//! populated on login or refresh, cleared on logout or irrecoverable refresh
//! failure. The `refresh_in_flight` flag is the mutual-exclusion gate over
//! the refresh protocol; `waiters` holds the continuations of calls that hit
//! a 401 while a refresh was already running.
//! ============================================================================

use serde::Serialize;
use tokio::sync::oneshot;

use crate::token_store::TokenPair;

/// Outcome of a refresh cycle, delivered to every queued waiter. Waiters are
/// all settled together, atomically with the session update.
#[derive(Debug)]
pub(crate) enum RefreshOutcome {
    /// Refresh succeeded; carries the new access token for replay.
    Refreshed(String),
    /// Refresh failed; the session has been cleared.
    Expired,
}

#[derive(Default)]
pub(crate) struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub refresh_in_flight: bool,
    pub waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

impl Session {
    pub fn set_tokens(&mut self, pair: &TokenPair) {
        self.access_token = Some(pair.access_token.clone());
        self.refresh_token = Some(pair.refresh_token.clone());
    }

    pub fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            authenticated: self.access_token.is_some(),
            has_refresh_token: self.refresh_token.is_some(),
            refresh_in_flight: self.refresh_in_flight,
            pending_requests: self.waiters.len(),
        }
    }
}

/// Read-only view of the session for diagnostics. Token values are never
/// exposed here.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub has_refresh_token: bool,
    pub refresh_in_flight: bool,
    pub pending_requests: usize,
}
