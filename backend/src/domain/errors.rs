//! Error taxonomy shared by the signaling path and the media path.

use super::value_objects::SessionId;

/// Errors surfaced by the bridge core.
///
/// Negotiation errors ([`InvalidOffer`](Self::InvalidOffer),
/// [`NegotiationFailed`](Self::NegotiationFailed),
/// [`SessionLimitReached`](Self::SessionLimitReached)) are returned
/// synchronously to the HTTP caller. Media errors
/// ([`SourceUnavailable`](Self::SourceUnavailable),
/// [`TransportFailure`](Self::TransportFailure)) happen after the answer was
/// sent and are only observable through session state and logs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// The offer payload is not a well-formed `{"sdp", "type": "offer"}` object.
    #[error("invalid offer: {0}")]
    InvalidOffer(String),

    /// The transport could not produce or apply a session description.
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    /// The capture source failed again after its single reopen attempt.
    #[error("source {locator} unavailable: {reason}")]
    SourceUnavailable { locator: String, reason: String },

    /// The transport reported a failure after negotiation completed.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Admission control refused a new session.
    #[error("session limit reached ({limit} live sessions)")]
    SessionLimitReached { limit: usize },

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("invalid source locator: {0}")]
    InvalidLocator(String),
}

impl BridgeError {
    /// Stable kebab-case code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidOffer(_) => "invalid-offer",
            Self::NegotiationFailed(_) => "negotiation-failed",
            Self::SourceUnavailable { .. } => "source-unavailable",
            Self::TransportFailure(_) => "transport-failure",
            Self::SessionLimitReached { .. } => "session-limit-reached",
            Self::SessionNotFound(_) => "session-not-found",
            Self::InvalidLocator(_) => "invalid-locator",
        }
    }

    /// Errors that end media delivery for a session.
    pub fn is_media_failure(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. } | Self::TransportFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_failures() {
        let source = BridgeError::SourceUnavailable {
            locator: "rtsp://camera/stream".to_string(),
            reason: "end of stream".to_string(),
        };
        assert!(source.is_media_failure());
        assert!(BridgeError::TransportFailure("dtls".to_string()).is_media_failure());
        assert!(!BridgeError::InvalidOffer("no sdp".to_string()).is_media_failure());
        assert_eq!(source.code(), "source-unavailable");
        assert_eq!(
            source.to_string(),
            "source rtsp://camera/stream unavailable: end of stream"
        );
    }
}
