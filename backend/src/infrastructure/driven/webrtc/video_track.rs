use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::application::ports::{FrameSink, TransportError, VideoEncoder};
use crate::domain::value_objects::VideoFrame;

/// Encodes frames and writes them as samples to a local track.
///
/// Encoding runs on the caller's thread (the session's frame pump), never
/// on the async workers.
pub struct EncodedVideoSink {
    track: Arc<TrackLocalStaticSample>,
    encoder: Mutex<Box<dyn VideoEncoder>>,
}

impl EncodedVideoSink {
    pub fn new(track: Arc<TrackLocalStaticSample>, encoder: Box<dyn VideoEncoder>) -> Self {
        Self {
            track,
            encoder: Mutex::new(encoder),
        }
    }
}

#[async_trait]
impl FrameSink for EncodedVideoSink {
    async fn push_frame(&self, frame: VideoFrame) -> Result<(), TransportError> {
        let chunks = {
            let mut encoder = self
                .encoder
                .lock()
                .map_err(|_| TransportError::Media("encoder lock poisoned".to_string()))?;
            encoder.encode(&frame)?
        };

        for chunk in chunks {
            let sample = Sample {
                data: chunk.data,
                duration: chunk.duration,
                ..Default::default()
            };
            self.track
                .write_sample(&sample)
                .await
                .map_err(|e| TransportError::Media(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::EncodedChunk;
    use crate::domain::value_objects::PixelFormat;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

    struct CountingEncoder {
        frames: Arc<AtomicUsize>,
        fail: bool,
    }

    impl VideoEncoder for CountingEncoder {
        fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<EncodedChunk>, TransportError> {
            if self.fail {
                return Err(TransportError::Media("encoder rejected frame".to_string()));
            }
            self.frames.fetch_add(1, Ordering::SeqCst);
            Ok(vec![EncodedChunk {
                data: Bytes::from_static(&[0x10, 0x02, 0x00]),
                duration: frame.duration,
            }])
        }
    }

    fn track() -> Arc<TrackLocalStaticSample> {
        Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: 90_000,
                ..Default::default()
            },
            "video".to_string(),
            "test".to_string(),
        ))
    }

    fn frame() -> VideoFrame {
        VideoFrame {
            width: 2,
            height: 1,
            format: PixelFormat::Rgb24,
            data: Bytes::from_static(&[0; 6]),
            pts: 0,
            duration: Duration::from_millis(33),
        }
    }

    #[tokio::test]
    async fn test_frames_are_encoded_before_binding() {
        let frames = Arc::new(AtomicUsize::new(0));
        let sink = EncodedVideoSink::new(
            track(),
            Box::new(CountingEncoder {
                frames: Arc::clone(&frames),
                fail: false,
            }),
        );

        // An unbound track accepts samples and drops them
        sink.push_frame(frame()).await.unwrap();
        sink.push_frame(frame()).await.unwrap();
        assert_eq!(frames.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_encoder_failure_is_reported() {
        let sink = EncodedVideoSink::new(
            track(),
            Box::new(CountingEncoder {
                frames: Arc::default(),
                fail: true,
            }),
        );

        assert!(matches!(sink.push_frame(frame()).await, Err(TransportError::Media(_))));
    }
}
