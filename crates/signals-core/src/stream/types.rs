//! ============================================================================
//! Stream Types - Wire shape of signal frames and stream events
//! ============================================================================
//! Inbound frames keep the server's Portuguese field names on the wire;
//! everything past the serde boundary uses the client's vocabulary.
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::SignalTier;

/// A signal event pushed from the server. Immutable once received; the
/// recency flag lives in the feed buffer, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    #[serde(rename = "campeonato")]
    pub competition: String,
    #[serde(rename = "nomeTimes")]
    pub teams: String,
    #[serde(rename = "tempoPartida")]
    pub match_clock: String,
    #[serde(rename = "placar")]
    pub score: String,
    #[serde(rename = "acaoSinal")]
    pub action: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "status")]
    pub lifecycle: LifecycleStatus,
    #[serde(rename = "tipoEvento", default)]
    pub tier: SignalTier,
}

/// Whether a signal is still live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleStatus {
    #[serde(alias = "active")]
    Active,
    #[serde(alias = "inactive")]
    Inactive,
}

/// Connection state machine of the stream manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Event delivered to stream subscribers, in transport arrival order.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A signal frame arrived. Fresh signals are recent until the matching
    /// `RecencyElapsed` event fires.
    Signal(Signal),
    /// The fixed recency window for a signal elapsed.
    RecencyElapsed { id: String },
    /// The connection state changed.
    State(ConnectionState),
}
