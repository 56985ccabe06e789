use bytes::Bytes;
use std::time::Duration;

use crate::domain::value_objects::VideoFrame;

use super::transport_ports::TransportError;

/// Codec negotiated for the outgoing video track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecSpec {
    pub mime_type: String,
    pub clock_rate: u32,
    pub sdp_fmtp_line: String,
    pub payload_type: u8,
}

/// One encoded access unit
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub data: Bytes,
    pub duration: Duration,
}

/// Port for a per-track video encoder
pub trait VideoEncoder: Send {
    /// Encode one RGB frame. Encoders with latency may return nothing for
    /// early frames and several chunks later on.
    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<EncodedChunk>, TransportError>;
}

/// Port for creating encoders for new tracks
pub trait EncoderFactory: Send + Sync {
    fn codec(&self) -> CodecSpec;

    fn create(&self, frame_rate: u32) -> Result<Box<dyn VideoEncoder>, TransportError>;
}
