use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::media::{FramePump, SourceTrack};
use crate::application::ports::{FrameSink, PeerConnection};
use crate::domain::aggregates::{ConnectionState, PeerSession, Transition};
use crate::domain::errors::BridgeError;
use crate::domain::value_objects::SessionId;

/// Media side of a session: where its source track currently lives
enum MediaBinding {
    Unbound,
    /// Negotiated but not yet connected; the track waits here
    Pending {
        track: SourceTrack,
        sink: Arc<dyn FrameSink>,
    },
    /// The pump thread owns the track
    Running(FramePump),
    Released,
}

/// Live session: the aggregate plus the resources it owns.
pub struct SessionHandle {
    id: SessionId,
    session: RwLock<PeerSession>,
    connection: Arc<dyn PeerConnection>,
    media: Mutex<MediaBinding>,
    faults: mpsc::UnboundedSender<BridgeError>,
    cancel: CancellationToken,
    shut_down: AtomicBool,
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        connection: Arc<dyn PeerConnection>,
        faults: mpsc::UnboundedSender<BridgeError>,
    ) -> Self {
        Self {
            session: RwLock::new(PeerSession::new(id.clone())),
            id,
            connection,
            media: Mutex::new(MediaBinding::Unbound),
            faults,
            cancel: CancellationToken::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn connection(&self) -> &Arc<dyn PeerConnection> {
        &self.connection
    }

    /// Point-in-time copy of the aggregate
    pub async fn snapshot(&self) -> PeerSession {
        self.session.read().await.clone()
    }

    pub async fn state(&self) -> ConnectionState {
        self.session.read().await.state
    }

    /// Cancelled once the session starts closing
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn is_media_running(&self) -> bool {
        matches!(&*self.media.lock().await, MediaBinding::Running(pump) if !pump.is_finished())
    }

    /// Attach the session's one and only source track.
    pub(crate) async fn bind(&self, track: SourceTrack, sink: Arc<dyn FrameSink>) -> Result<(), BridgeError> {
        let mut media = self.media.lock().await;
        if !matches!(*media, MediaBinding::Unbound) {
            return Err(BridgeError::NegotiationFailed(format!(
                "session {} already has a source track",
                self.id
            )));
        }
        self.session.write().await.bind_track(track.config().id.clone())?;
        *media = MediaBinding::Pending { track, sink };
        Ok(())
    }

    pub(crate) async fn record_remote_offer(&self) {
        self.session.write().await.record_remote_offer();
    }

    pub(crate) async fn record_local_answer(&self) {
        self.session.write().await.record_local_answer();
    }

    pub(crate) async fn observe(&self, state: ConnectionState) -> Transition {
        self.session.write().await.observe(state)
    }

    /// Hand the pending track to a pump thread. No-op unless pending.
    pub(crate) async fn start_media(&self) -> Result<(), BridgeError> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let mut media = self.media.lock().await;
        let (track, sink) = match std::mem::replace(&mut *media, MediaBinding::Released) {
            MediaBinding::Pending { track, sink } => (track, sink),
            other => {
                *media = other;
                return Ok(());
            }
        };

        let pump = FramePump::spawn(
            self.id.clone(),
            track,
            sink,
            self.faults.clone(),
            self.cancel.child_token(),
            Handle::current(),
        )
        .map_err(|e| BridgeError::TransportFailure(format!("failed to start frame pump: {}", e)))?;

        *media = MediaBinding::Running(pump);
        Ok(())
    }

    /// Cancel the session and wait until no frame can reach the sink.
    /// Releases the source track either way.
    pub(crate) async fn stop_media(&self) {
        self.cancel.cancel();

        let binding = std::mem::replace(&mut *self.media.lock().await, MediaBinding::Released);
        match binding {
            MediaBinding::Running(pump) => pump.stop().await,
            MediaBinding::Pending { track, .. } => drop(track),
            MediaBinding::Unbound | MediaBinding::Released => {}
        }
    }

    /// Stop media, release the source and close the transport.
    ///
    /// Returns false when the session had already been shut down.
    pub(crate) async fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.stop_media().await;

        if let Err(e) = self.connection.close().await {
            warn!(session = %self.id, "Error closing peer connection: {}", e);
        }

        self.session.write().await.close();
        debug!(session = %self.id, "Session resources released");
        true
    }
}
