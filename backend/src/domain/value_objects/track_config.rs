use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::video_frame::VIDEO_CLOCK_RATE;

/// Immutable description of the video track bound to one session.
///
/// Fixed when the session binds its source; the transport reads it while
/// adding the track and never mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub id: String,
    pub stream_id: String,
    pub frame_rate: u32,
}

impl TrackConfig {
    pub fn video(stream_id: impl Into<String>, frame_rate: u32) -> Self {
        Self {
            id: "video".to_string(),
            stream_id: stream_id.into(),
            frame_rate: frame_rate.max(1),
        }
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }

    /// Frame period expressed in ticks of the 90 kHz video clock.
    pub fn period_ticks(&self) -> u64 {
        u64::from(VIDEO_CLOCK_RATE / self.frame_rate.max(1))
    }
}
