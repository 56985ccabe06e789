use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::{SdpType, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::{
    api::{
        interceptor_registry::register_default_interceptors, media_engine::MediaEngine,
        setting_engine::SettingEngine, APIBuilder, API,
    },
    ice_transport::ice_server::RTCIceServer,
    interceptor::registry::Registry,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        sdp::sdp_type::RTCSdpType, sdp::session_description::RTCSessionDescription, RTCPeerConnection,
    },
    rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType},
    track::track_local::{track_local_static_sample::TrackLocalStaticSample, TrackLocal},
};

use crate::application::ports::{
    CodecSpec, EncoderFactory, FrameSink, PeerConnection, PeerTransport, StateEvents, TransportError,
};
use crate::config::WebRtcSettings;
use crate::domain::aggregates::ConnectionState;
use crate::domain::value_objects::{SessionId, TrackConfig};

use super::video_track::EncodedVideoSink;

/// webrtc-rs implementation of the transport capability.
///
/// One `API` (media engine, interceptors, ICE timeouts) is shared by every
/// peer connection the process creates.
pub struct WebRtcTransport {
    api: API,
    config: RTCConfiguration,
    encoders: Arc<dyn EncoderFactory>,
}

impl WebRtcTransport {
    pub fn new(settings: &WebRtcSettings, encoders: Arc<dyn EncoderFactory>) -> Result<Self> {
        let codec = encoders.codec();

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: capability(&codec),
                    payload_type: codec.payload_type,
                    ..Default::default()
                },
                RTPCodecType::Video,
            )
            .with_context(|| format!("Failed to register codec {}", codec.mime_type))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .context("Failed to register default interceptors")?;

        let mut setting_engine = SettingEngine::default();
        setting_engine.set_ice_timeouts(
            Some(settings.disconnected_timeout()),
            Some(settings.failed_timeout()),
            Some(settings.keepalive_interval()),
        );

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build();

        let ice_servers = if settings.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: settings.ice_servers.clone(),
                ..Default::default()
            }]
        };

        info!("WebRTC transport ready ({}, {} ICE servers)", codec.mime_type, settings.ice_servers.len());

        Ok(Self {
            api,
            config: RTCConfiguration {
                ice_servers,
                ..Default::default()
            },
            encoders,
        })
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_session(
        &self,
        id: &SessionId,
    ) -> Result<(Arc<dyn PeerConnection>, StateEvents), TransportError> {
        let pc = Arc::new(
            self.api
                .new_peer_connection(self.config.clone())
                .await
                .map_err(|e| TransportError::Negotiation(format!("failed to create peer connection: {}", e)))?,
        );

        // Installed before the connection is handed out, so the first
        // transition is never missed
        let (states, events) = mpsc::unbounded_channel();
        let session = id.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            match connection_state(s) {
                Some(state) => {
                    if states.send(state).is_err() {
                        debug!(session = %session, "State {} after observer finished", s);
                    }
                }
                None => debug!(session = %session, "Ignoring unspecified peer connection state"),
            }
            Box::pin(async {})
        }));

        debug!(session = %id, "Created peer connection");

        let connection = WebRtcPeerConnection {
            id: id.clone(),
            pc,
            encoders: Arc::clone(&self.encoders),
        };
        Ok((Arc::new(connection), events))
    }
}

/// One webrtc-rs peer connection
pub struct WebRtcPeerConnection {
    id: SessionId,
    pc: Arc<RTCPeerConnection>,
    encoders: Arc<dyn EncoderFactory>,
}

#[async_trait]
impl PeerConnection for WebRtcPeerConnection {
    async fn add_video_track(&self, track: &TrackConfig) -> Result<Arc<dyn FrameSink>, TransportError> {
        let codec = self.encoders.codec();
        let local_track = Arc::new(TrackLocalStaticSample::new(
            capability(&codec),
            track.id.clone(),
            track.stream_id.clone(),
        ));

        let sender = self
            .pc
            .add_track(Arc::clone(&local_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| TransportError::Negotiation(format!("failed to add track: {}", e)))?;

        // Interceptors only see RTCP (NACK, PLI) if somebody reads it
        let session = self.id.clone();
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
            debug!(session = %session, "RTCP reader finished");
        });

        let encoder = self.encoders.create(track.frame_rate)?;
        debug!(session = %self.id, "Added {} track {}", codec.mime_type, track.id);

        Ok(Arc::new(EncodedVideoSink::new(local_track, encoder)))
    }

    async fn set_remote_description(&self, offer: &SessionDescription) -> Result<(), TransportError> {
        let description = to_rtc(offer)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| TransportError::Negotiation(format!("failed to set remote description: {}", e)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| TransportError::Negotiation(format!("failed to create answer: {}", e)))?;
        from_rtc(&answer)
            .ok_or_else(|| TransportError::Negotiation("answer has no SDP type".to_string()))
    }

    async fn set_local_description(&self, answer: &SessionDescription) -> Result<(), TransportError> {
        let description = to_rtc(answer)?;
        let mut gather_complete = self.pc.gathering_complete_promise().await;

        self.pc
            .set_local_description(description)
            .await
            .map_err(|e| TransportError::Negotiation(format!("failed to set local description: {}", e)))?;

        // Non-trickle signaling: the answer must already carry candidates
        let _ = gather_complete.recv().await;
        debug!(session = %self.id, "ICE gathering complete");
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.as_ref().and_then(from_rtc)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc.close().await.map_err(|e| {
            warn!(session = %self.id, "Peer connection close failed: {}", e);
            TransportError::Media(e.to_string())
        })
    }
}

fn capability(codec: &CodecSpec) -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: codec.mime_type.clone(),
        clock_rate: codec.clock_rate,
        channels: 0,
        sdp_fmtp_line: codec.sdp_fmtp_line.clone(),
        rtcp_feedback: vec![],
    }
}

fn connection_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(ConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

fn to_rtc(description: &SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    let sdp = description.sdp.clone();
    let converted = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(sdp),
        SdpType::Answer => RTCSessionDescription::answer(sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
        SdpType::Rollback => {
            return Err(TransportError::Negotiation("rollback is not supported".to_string()))
        }
    };
    converted.map_err(|e| TransportError::Negotiation(format!("unparsable SDP: {}", e)))
}

fn from_rtc(description: &RTCSessionDescription) -> Option<SessionDescription> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => return None,
    };
    Some(SessionDescription {
        sdp: description.sdp.clone(),
        sdp_type,
    })
}
