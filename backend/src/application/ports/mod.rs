// Application ports - Driven ports (output ports implemented by infrastructure)

pub mod capture_ports;
pub mod encoder_ports;
pub mod transport_ports;

pub use capture_ports::{CaptureBackend, CaptureError, CaptureHandle, CaptureOptions, RawFrame, SourceTransport};
pub use encoder_ports::{CodecSpec, EncodedChunk, EncoderFactory, VideoEncoder};
pub use transport_ports::{FrameSink, PeerConnection, PeerTransport, StateEvents, TransportError};

#[cfg(test)]
pub use capture_ports::{MockCaptureBackend, MockCaptureHandle};
