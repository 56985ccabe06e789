use shared::{SdpType, SessionDescription};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::media::SourceTrack;
use crate::application::ports::{CaptureBackend, CaptureOptions};
use crate::application::session::{SessionHandle, SessionLifecycle};
use crate::domain::errors::BridgeError;
use crate::domain::value_objects::{SessionId, SourceLocator, TrackConfig};

/// Decode and validate a `{"sdp", "type": "offer"}` request body.
pub fn parse_offer(body: &[u8]) -> Result<SessionDescription, BridgeError> {
    let offer: SessionDescription =
        serde_json::from_slice(body).map_err(|e| BridgeError::InvalidOffer(e.to_string()))?;
    validate_offer(&offer)?;
    Ok(offer)
}

fn validate_offer(offer: &SessionDescription) -> Result<(), BridgeError> {
    if offer.sdp_type != SdpType::Offer {
        return Err(BridgeError::InvalidOffer(format!(
            "expected type \"offer\", got \"{}\"",
            offer.sdp_type
        )));
    }
    if offer.sdp.trim().is_empty() {
        return Err(BridgeError::InvalidOffer("sdp is empty".to_string()));
    }
    Ok(())
}

/// The one upstream source every session is bound to
#[derive(Debug, Clone)]
pub struct SourceBinding {
    pub locator: SourceLocator,
    pub options: CaptureOptions,
    pub frame_rate: u32,
}

/// Turns an offer into a negotiated session with a bound source track.
pub struct SignalingHandler {
    lifecycle: Arc<SessionLifecycle>,
    capture: Arc<dyn CaptureBackend>,
    source: SourceBinding,
}

impl SignalingHandler {
    pub fn new(
        lifecycle: Arc<SessionLifecycle>,
        capture: Arc<dyn CaptureBackend>,
        source: SourceBinding,
    ) -> Self {
        Self {
            lifecycle,
            capture,
            source,
        }
    }

    pub fn lifecycle(&self) -> &Arc<SessionLifecycle> {
        &self.lifecycle
    }

    pub fn source(&self) -> &SourceBinding {
        &self.source
    }

    /// Negotiate a new session and return its finalized local description.
    ///
    /// The session is observed from the moment it exists. When any step
    /// fails the session is closed again and the caller gets
    /// `NegotiationFailed`; admission refusals pass through unchanged.
    /// Dropping the returned future before it completes (a client that
    /// hung up) also closes the session.
    pub async fn handle_offer(&self, offer: SessionDescription) -> Result<SessionDescription, BridgeError> {
        validate_offer(&offer)?;

        let handle = self.lifecycle.open_session().await?;
        let guard = PendingSession::new(&self.lifecycle, handle.id());
        debug!(session = %handle.id(), "Negotiating offer ({} bytes of SDP)", offer.sdp.len());

        let result = self.negotiate(&handle, &offer).await;
        guard.disarm();
        match result {
            Ok(answer) => {
                info!(session = %handle.id(), "Answer ready");
                Ok(answer)
            }
            Err(e) => {
                warn!(session = %handle.id(), "Negotiation aborted: {}", e);
                self.lifecycle.close(handle.id()).await;
                Err(match e {
                    BridgeError::NegotiationFailed(_) => e,
                    other => BridgeError::NegotiationFailed(other.to_string()),
                })
            }
        }
    }

    async fn negotiate(
        &self,
        handle: &SessionHandle,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, BridgeError> {
        let connection = handle.connection();

        let track = self.open_track(handle).await?;
        let sink = connection
            .add_video_track(track.config())
            .await
            .map_err(negotiation_failed)?;
        handle.bind(track, sink).await?;
        debug!(session = %handle.id(), "Source track bound");

        connection
            .set_remote_description(offer)
            .await
            .map_err(negotiation_failed)?;
        handle.record_remote_offer().await;

        let answer = connection.create_answer().await.map_err(negotiation_failed)?;
        connection
            .set_local_description(&answer)
            .await
            .map_err(negotiation_failed)?;
        handle.record_local_answer().await;

        connection
            .local_description()
            .await
            .ok_or_else(|| BridgeError::NegotiationFailed("no local description after answer".to_string()))
    }

    /// Opening a source blocks on I/O, so it runs off the async workers
    async fn open_track(&self, handle: &SessionHandle) -> Result<SourceTrack, BridgeError> {
        let backend = Arc::clone(&self.capture);
        let locator = self.source.locator.clone();
        let options = self.source.options.clone();
        let config = TrackConfig::video(handle.id().as_str(), self.source.frame_rate);

        tokio::task::spawn_blocking(move || SourceTrack::open(backend, locator, options, config))
            .await
            .map_err(|e| BridgeError::NegotiationFailed(format!("source open task failed: {}", e)))?
    }
}

/// Closes a session whose negotiation was abandoned midway
struct PendingSession {
    lifecycle: Arc<SessionLifecycle>,
    id: SessionId,
    armed: bool,
}

impl PendingSession {
    fn new(lifecycle: &Arc<SessionLifecycle>, id: &SessionId) -> Self {
        Self {
            lifecycle: Arc::clone(lifecycle),
            id: id.clone(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(session = %self.id, "Negotiation abandoned without a runtime, session left open");
            return;
        };
        warn!(session = %self.id, "Negotiation abandoned, closing session");
        let lifecycle = Arc::clone(&self.lifecycle);
        let id = self.id.clone();
        runtime.spawn(async move {
            lifecycle.close(&id).await;
        });
    }
}

fn negotiation_failed(e: crate::application::ports::TransportError) -> BridgeError {
    BridgeError::NegotiationFailed(e.to_string())
}
