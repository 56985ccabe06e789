use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSrc};
use std::time::Duration;
use tracing::{debug, warn};
use webrtc::api::media_engine::MIME_TYPE_VP8;

use crate::application::ports::{CodecSpec, EncodedChunk, EncoderFactory, TransportError, VideoEncoder};
use crate::domain::value_objects::{PixelFormat, VideoFrame, VIDEO_CLOCK_RATE};

use super::bus_error;

/// Realtime VP8 through `vp8enc`
pub struct Vp8EncoderFactory {}

impl Vp8EncoderFactory {
    pub fn new() -> Result<Self> {
        super::init()?;
        gst::ElementFactory::find("vp8enc").ok_or_else(|| anyhow!("GStreamer element vp8enc is not installed"))?;
        Ok(Self {})
    }
}

impl EncoderFactory for Vp8EncoderFactory {
    fn codec(&self) -> CodecSpec {
        CodecSpec {
            mime_type: MIME_TYPE_VP8.to_string(),
            clock_rate: VIDEO_CLOCK_RATE,
            sdp_fmtp_line: String::new(),
            payload_type: 96,
        }
    }

    fn create(&self, frame_rate: u32) -> Result<Box<dyn VideoEncoder>, TransportError> {
        Ok(Box::new(Vp8Encoder {
            frame_rate: frame_rate.max(1),
            pipeline: None,
        }))
    }
}

/// Encoder for one track. The pipeline is built on the first frame and
/// rebuilt whenever the frame size changes.
struct Vp8Encoder {
    frame_rate: u32,
    pipeline: Option<EncoderPipeline>,
}

impl VideoEncoder for Vp8Encoder {
    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<EncodedChunk>, TransportError> {
        if frame.format != PixelFormat::Rgb24 {
            return Err(TransportError::Media(format!("vp8 encoder expects RGB, got {:?}", frame.format)));
        }

        let stale = self
            .pipeline
            .as_ref()
            .map_or(true, |p| p.width != frame.width || p.height != frame.height);
        if stale {
            // Drop the old pipeline before starting a new one
            self.pipeline = None;
            let pipeline = EncoderPipeline::build(frame.width, frame.height, self.frame_rate)
                .map_err(|e| TransportError::Media(format!("{:#}", e)))?;
            debug!("VP8 encoder configured for {}x{}", frame.width, frame.height);
            self.pipeline = Some(pipeline);
        }

        match self.pipeline.as_ref() {
            Some(pipeline) => pipeline.encode(frame),
            None => Err(TransportError::Closed),
        }
    }
}

/// `appsrc(RGB) ! videoconvert ! vp8enc ! appsink`
struct EncoderPipeline {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    appsink: AppSink,
    width: u32,
    height: u32,
}

impl EncoderPipeline {
    fn build(width: u32, height: u32, frame_rate: u32) -> Result<Self> {
        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .field("width", i32::try_from(width).context("Frame width out of range")?)
            .field("height", i32::try_from(height).context("Frame height out of range")?)
            .field("framerate", gst::Fraction::new(i32::try_from(frame_rate)?, 1))
            .build();

        let appsrc = AppSrc::builder()
            .caps(&caps)
            .format(gst::Format::Time)
            .is_live(true)
            .build();

        let videoconvert = gst::ElementFactory::make("videoconvert")
            .build()
            .context("Failed to create videoconvert")?;

        let vp8enc = gst::ElementFactory::make("vp8enc")
            .property("deadline", 1i64)
            .property("cpu-used", 8i32)
            .property("target-bitrate", 1_000_000i32)
            .property("lag-in-frames", 0i32)
            .build()
            .context("Failed to create vp8enc")?;

        let appsink = AppSink::builder().sync(false).build();

        let pipeline = gst::Pipeline::default();
        pipeline.add_many([appsrc.upcast_ref(), &videoconvert, &vp8enc, appsink.upcast_ref()])?;
        gst::Element::link_many([appsrc.upcast_ref(), &videoconvert, &vp8enc, appsink.upcast_ref()])
            .context("Failed to link appsrc -> videoconvert -> vp8enc -> appsink")?;

        pipeline
            .set_state(gst::State::Playing)
            .context("Failed to start encoder pipeline")?;

        Ok(Self {
            pipeline,
            appsrc,
            appsink,
            width,
            height,
        })
    }

    fn encode(&self, frame: &VideoFrame) -> Result<Vec<EncodedChunk>, TransportError> {
        let mut buffer = gst::Buffer::from_slice(frame.data.clone());
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(clock_time(frame.pts_as_duration()));
            buffer.set_duration(clock_time(frame.duration));
        }

        self.appsrc.push_buffer(buffer).map_err(|e| {
            let reason = bus_error(&self.pipeline).unwrap_or_else(|| format!("{:?}", e));
            TransportError::Media(format!("vp8 encoder rejected frame: {}", reason))
        })?;

        // Wait up to one frame period for this frame, then take whatever
        // else is already queued
        let mut chunks = Vec::new();
        let mut wait = clock_time(frame.duration);
        while let Some(sample) = self.appsink.try_pull_sample(wait) {
            wait = gst::ClockTime::ZERO;
            let Some(buffer) = sample.buffer() else {
                continue;
            };
            let map = buffer
                .map_readable()
                .map_err(|e| TransportError::Media(e.to_string()))?;
            chunks.push(EncodedChunk {
                data: Bytes::copy_from_slice(map.as_slice()),
                duration: frame.duration,
            });
        }
        Ok(chunks)
    }
}

impl Drop for EncoderPipeline {
    fn drop(&mut self) {
        let _ = self.appsrc.end_of_stream();
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("Failed to stop encoder pipeline: {}", e);
        }
    }
}

fn clock_time(duration: Duration) -> gst::ClockTime {
    gst::ClockTime::from_nseconds(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64, width: u32, height: u32) -> VideoFrame {
        VideoFrame {
            width,
            height,
            format: PixelFormat::Rgb24,
            data: Bytes::from(vec![(index * 16) as u8; (width * height * 3) as usize]),
            pts: index * 3000,
            duration: Duration::from_millis(33),
        }
    }

    #[test]
    fn test_codec_is_vp8() {
        let Ok(factory) = Vp8EncoderFactory::new() else {
            eprintln!("vp8enc unavailable, skipping");
            return;
        };
        let codec = factory.codec();
        assert_eq!(codec.mime_type, "video/VP8");
        assert_eq!(codec.clock_rate, 90_000);
    }

    #[test]
    fn test_encodes_frames_and_follows_size_changes() {
        let Ok(factory) = Vp8EncoderFactory::new() else {
            eprintln!("vp8enc unavailable, skipping");
            return;
        };
        let mut encoder = factory.create(30).unwrap();

        let mut chunks = 0;
        for i in 0..5 {
            chunks += encoder.encode(&frame(i, 64, 48)).unwrap().len();
        }
        assert!(chunks > 0, "no VP8 output after 5 frames");

        // Resizing restarts the pipeline instead of failing
        let mut resized = 0;
        for i in 5..10 {
            resized += encoder.encode(&frame(i, 32, 32)).unwrap().len();
        }
        assert!(resized > 0);
    }

    #[test]
    fn test_rejects_bgr_frames() {
        let Ok(factory) = Vp8EncoderFactory::new() else {
            eprintln!("vp8enc unavailable, skipping");
            return;
        };
        let mut encoder = factory.create(30).unwrap();
        let mut bgr = frame(0, 4, 4);
        bgr.format = PixelFormat::Bgr24;
        assert!(matches!(encoder.encode(&bgr), Err(TransportError::Media(_))));
    }
}
