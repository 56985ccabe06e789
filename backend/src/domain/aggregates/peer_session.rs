use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::BridgeError;
use crate::domain::value_objects::SessionId;

/// Peer session aggregate root
/// One viewer's connection, from the received offer to teardown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSession {
    pub id: SessionId,
    pub state: ConnectionState,
    pub negotiation: NegotiationState,
    pub track_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl PeerSession {
    /// Create a new session in the `new` state
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: ConnectionState::New,
            negotiation: NegotiationState::default(),
            track_id: None,
            created_at: Utc::now(),
            connected_at: None,
            closed_at: None,
        }
    }

    /// Bind the session's single video track
    pub fn bind_track(&mut self, track_id: impl Into<String>) -> Result<(), BridgeError> {
        if let Some(existing) = &self.track_id {
            return Err(BridgeError::NegotiationFailed(format!(
                "session {} already has track {}",
                self.id, existing
            )));
        }
        self.track_id = Some(track_id.into());
        Ok(())
    }

    pub fn record_remote_offer(&mut self) {
        self.negotiation.has_remote_offer = true;
    }

    pub fn record_local_answer(&mut self) {
        self.negotiation.has_local_answer = true;
    }

    /// Apply a connectivity state reported by the transport.
    ///
    /// The transport is authoritative, so plausible transitions outside the
    /// nominal graph are applied and reported as [`Transition::Unexpected`].
    /// Nothing leaves `closed`, and `failed` only moves on to `closed`.
    pub fn observe(&mut self, next: ConnectionState) -> Transition {
        let from = self.state;
        if from == next {
            return Transition::Unchanged;
        }
        if from.is_terminal() || (from == ConnectionState::Failed && next != ConnectionState::Closed) {
            return Transition::Ignored { from, to: next };
        }

        self.state = next;
        match next {
            ConnectionState::Connected if self.connected_at.is_none() => {
                self.connected_at = Some(Utc::now());
            }
            ConnectionState::Closed => self.closed_at = Some(Utc::now()),
            _ => {}
        }

        if from.can_transition_to(next) {
            Transition::Applied { from, to: next }
        } else {
            Transition::Unexpected { from, to: next }
        }
    }

    /// Move to `closed`. Returns false when the session was already closed.
    pub fn close(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = ConnectionState::Closed;
        self.closed_at = Some(Utc::now());
        true
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Offer/answer progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationState {
    pub has_remote_offer: bool,
    pub has_local_answer: bool,
}

impl NegotiationState {
    pub fn is_complete(&self) -> bool {
        self.has_remote_offer && self.has_local_answer
    }
}

/// Connectivity state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 6] = [
        ConnectionState::New,
        ConnectionState::Connecting,
        ConnectionState::Connected,
        ConnectionState::Disconnected,
        ConnectionState::Failed,
        ConnectionState::Closed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    /// Edges of the nominal state graph
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Closed, _) => false,
            (Failed, Closed) => true,
            (Failed, _) => false,
            (_, Failed) | (_, Closed) => true,
            (New, Connecting)
            | (Connecting, Connected)
            | (Connected, Disconnected)
            | (Disconnected, Connecting) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`PeerSession::observe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: ConnectionState, to: ConnectionState },
    Unexpected { from: ConnectionState, to: ConnectionState },
    Ignored { from: ConnectionState, to: ConnectionState },
    Unchanged,
}
