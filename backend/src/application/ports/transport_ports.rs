use async_trait::async_trait;
use shared::SessionDescription;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::domain::aggregates::ConnectionState;
use crate::domain::value_objects::{SessionId, TrackConfig, VideoFrame};

/// Failures reported by the transport capability
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("{0}")]
    Negotiation(String),

    #[error("media delivery failed: {0}")]
    Media(String),

    #[error("peer connection is closed")]
    Closed,
}

/// Connectivity states pushed by the transport, in the order they happened
pub type StateEvents = mpsc::UnboundedReceiver<ConnectionState>;

/// Port for creating peer sessions
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create a peer connection. The returned receiver is subscribed before
    /// this call returns, so it sees every state the connection goes through.
    async fn create_session(
        &self,
        id: &SessionId,
    ) -> Result<(Arc<dyn PeerConnection>, StateEvents), TransportError>;
}

/// Port for one peer connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Add the outgoing video track, returning where its frames go
    async fn add_video_track(&self, track: &TrackConfig) -> Result<Arc<dyn FrameSink>, TransportError>;

    async fn set_remote_description(&self, offer: &SessionDescription) -> Result<(), TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, answer: &SessionDescription) -> Result<(), TransportError>;

    /// The finalized local description, once one has been set
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Release transport resources. Closing twice is harmless.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Port for delivering frames into a negotiated track
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn push_frame(&self, frame: VideoFrame) -> Result<(), TransportError>;
}
