pub mod peer_transport;
pub mod video_track;

pub use peer_transport::{WebRtcPeerConnection, WebRtcTransport};
pub use video_track::EncodedVideoSink;
