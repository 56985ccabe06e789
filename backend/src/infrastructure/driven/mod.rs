// Driven adapters: implementations of the application ports

#[cfg(feature = "gstreamer")]
pub mod gstreamer;
pub mod persistence;
pub mod webrtc;

#[cfg(feature = "gstreamer")]
pub use self::gstreamer::{GStreamerCapture, Vp8EncoderFactory};
pub use self::persistence::SessionRegistry;
pub use self::webrtc::WebRtcTransport;
