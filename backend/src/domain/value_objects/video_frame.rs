use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Clock rate of video timestamps (RTP video clock).
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Packed 8-bit-per-channel pixel layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        3
    }
}

/// A decoded, timestamped frame ready for the transport.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Bytes,
    /// Presentation timestamp in [`VIDEO_CLOCK_RATE`] ticks
    pub pts: u64,
    pub duration: Duration,
}

impl VideoFrame {
    pub fn pts_as_duration(&self) -> Duration {
        let rate = u64::from(VIDEO_CLOCK_RATE);
        Duration::from_secs(self.pts / rate)
            + Duration::from_nanos((self.pts % rate) * 1_000_000_000 / rate)
    }
}
