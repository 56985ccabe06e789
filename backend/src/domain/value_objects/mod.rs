pub mod session_id;
pub mod source_locator;
pub mod track_config;
pub mod video_frame;

pub use session_id::SessionId;
pub use source_locator::{SourceKind, SourceLocator};
pub use track_config::TrackConfig;
pub use video_frame::{PixelFormat, VideoFrame, VIDEO_CLOCK_RATE};
