use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video as gst_video;
use tracing::{debug, info, warn};

use crate::application::ports::{CaptureBackend, CaptureError, CaptureHandle, CaptureOptions, RawFrame, SourceTransport};
use crate::domain::value_objects::{PixelFormat, SourceLocator};

use super::bus_error;

/// Opens files and RTSP streams through `uridecodebin`
pub struct GStreamerCapture {}

impl GStreamerCapture {
    pub fn new() -> Result<Self> {
        super::init()?;
        Ok(Self {})
    }
}

impl CaptureBackend for GStreamerCapture {
    fn open(
        &self,
        locator: &SourceLocator,
        options: &CaptureOptions,
        frame_rate: u32,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let open_error = |reason: String| CaptureError::Open {
            locator: locator.to_string(),
            reason,
        };

        let uri = locator.to_uri().map_err(|e| open_error(e.to_string()))?;
        let handle = CapturePipeline::start(&uri, locator.is_live(), options, frame_rate)
            .map_err(|e| open_error(format!("{:#}", e)))?;

        info!("Capturing {} at {}fps", locator, frame_rate);
        Ok(Box::new(handle))
    }
}

/// `uridecodebin ! videoconvert ! videorate ! appsink(BGR)`
struct CapturePipeline {
    pipeline: gst::Pipeline,
    appsink: AppSink,
    timeout: gst::ClockTime,
}

impl CapturePipeline {
    fn start(uri: &str, live: bool, options: &CaptureOptions, frame_rate: u32) -> Result<Self> {
        let decodebin = gst::ElementFactory::make("uridecodebin")
            .property("uri", uri)
            .build()
            .context("Failed to create uridecodebin")?;

        let videoconvert = gst::ElementFactory::make("videoconvert")
            .build()
            .context("Failed to create videoconvert")?;

        let videorate = gst::ElementFactory::make("videorate")
            .build()
            .context("Failed to create videorate")?;

        let framerate = i32::try_from(frame_rate).context("Frame rate out of range")?;
        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "BGR")
            .field("framerate", gst::Fraction::new(framerate, 1))
            .build();

        // Live sources keep only the newest frame; files apply backpressure
        // so no frame is skipped
        let appsink = AppSink::builder()
            .caps(&caps)
            .sync(false)
            .max_buffers(if live { 1 } else { 2 })
            .drop(live)
            .build();

        let pipeline = gst::Pipeline::default();
        pipeline.add_many([&decodebin, &videoconvert, &videorate, appsink.upcast_ref()])?;
        gst::Element::link_many([&videoconvert, &videorate, appsink.upcast_ref()])
            .context("Failed to link videoconvert -> videorate -> appsink")?;

        let source_options = options.clone();
        decodebin.connect("source-setup", false, move |values| {
            if let Some(Ok(source)) = values.get(1).map(|v| v.get::<gst::Element>()) {
                configure_source(&source, &source_options);
            }
            None
        });

        let convert = videoconvert.downgrade();
        decodebin.connect_pad_added(move |_, src_pad| {
            let Some(convert) = convert.upgrade() else {
                return;
            };
            let Some(sink_pad) = convert.static_pad("sink") else {
                return;
            };
            if sink_pad.is_linked() || !is_video_pad(src_pad) {
                return;
            }
            if let Err(e) = src_pad.link(&sink_pad) {
                warn!("Failed to link decoded video pad: {:?}", e);
            }
        });

        let handle = Self {
            pipeline,
            appsink,
            timeout: gst::ClockTime::from_useconds(options.io_timeout_us),
        };

        handle
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|_| anyhow!(bus_error(&handle.pipeline).unwrap_or_else(|| "pipeline refused to start".to_string())))?;

        // Wait for preroll so a bad locator fails here rather than on read
        let (result, _, _) = handle.pipeline.state(handle.timeout);
        if let Err(e) = result {
            bail!(bus_error(&handle.pipeline).unwrap_or_else(|| e.to_string()));
        }
        if let Some(reason) = bus_error(&handle.pipeline) {
            bail!(reason);
        }

        debug!("Capture pipeline for {} is playing", uri);
        Ok(handle)
    }
}

impl CaptureHandle for CapturePipeline {
    fn read(&mut self) -> Result<RawFrame, CaptureError> {
        let Some(sample) = self.appsink.try_pull_sample(self.timeout) else {
            if self.appsink.is_eos() {
                return Err(CaptureError::EndOfStream);
            }
            if let Some(reason) = bus_error(&self.pipeline) {
                return Err(CaptureError::Io(reason));
            }
            return Err(CaptureError::Timeout);
        };

        let caps = sample
            .caps()
            .ok_or_else(|| CaptureError::Malformed("sample without caps".to_string()))?;
        let info = gst_video::VideoInfo::from_caps(caps).map_err(|e| CaptureError::Malformed(e.to_string()))?;
        let buffer = sample
            .buffer()
            .ok_or_else(|| CaptureError::Malformed("sample without buffer".to_string()))?;
        let map = buffer.map_readable().map_err(|e| CaptureError::Io(e.to_string()))?;

        let stride = usize::try_from(info.stride()[0])
            .map_err(|_| CaptureError::Malformed("negative stride".to_string()))?;
        let data = pack_rows(map.as_slice(), info.width(), info.height(), stride, info.offset()[0])?;

        Ok(RawFrame {
            width: info.width(),
            height: info.height(),
            format: PixelFormat::Bgr24,
            data: Bytes::from(data),
        })
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("Failed to stop capture pipeline: {}", e);
        }
    }
}

fn configure_source(source: &gst::Element, options: &CaptureOptions) {
    // Only rtspsrc has these; file sources are left alone
    if source.find_property("protocols").is_none() {
        return;
    }

    let protocols = match options.transport {
        SourceTransport::Tcp => "tcp",
        SourceTransport::Udp => "udp",
    };
    source.set_property_from_str("protocols", protocols);

    if source.find_property("tcp-timeout").is_some() {
        source.set_property("tcp-timeout", options.io_timeout_us);
    }
    if source.find_property("udp-buffer-size").is_some() {
        source.set_property("udp-buffer-size", i32::try_from(options.buffer_size).unwrap_or(i32::MAX));
    }
    if options.low_latency && source.find_property("latency").is_some() {
        source.set_property("latency", 0u32);
    }
    if source.find_property("drop-on-latency").is_some() {
        source.set_property("drop-on-latency", options.no_buffer);
    }

    debug!("Configured RTSP source over {}", protocols);
}

fn is_video_pad(pad: &gst::Pad) -> bool {
    let caps = pad.current_caps().unwrap_or_else(|| pad.query_caps(None));
    caps.structure(0)
        .map_or(false, |s| s.name().starts_with("video/"))
}

/// Copy `height` rows of `width * 3` bytes out of a padded plane
fn pack_rows(data: &[u8], width: u32, height: u32, stride: usize, offset: usize) -> Result<Vec<u8>, CaptureError> {
    let row = width as usize * PixelFormat::Bgr24.bytes_per_pixel();
    let rows = height as usize;
    if stride < row {
        return Err(CaptureError::Malformed(format!("stride {} shorter than row {}", stride, row)));
    }

    let mut packed = Vec::with_capacity(row * rows);
    for y in 0..rows {
        let start = offset + y * stride;
        let line = data
            .get(start..start + row)
            .ok_or_else(|| CaptureError::Malformed(format!("buffer too short for row {}", y)))?;
        packed.extend_from_slice(line);
    }
    Ok(packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_rows_strips_padding() {
        // 2x2 BGR with 8-byte stride (2 bytes of padding per row)
        let data = [1, 2, 3, 4, 5, 6, 0, 0, 7, 8, 9, 10, 11, 12, 0, 0];
        let packed = pack_rows(&data, 2, 2, 8, 0).unwrap();
        assert_eq!(packed, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_pack_rows_rejects_short_buffers() {
        let data = [0u8; 10];
        assert!(matches!(pack_rows(&data, 2, 2, 6, 0), Err(CaptureError::Malformed(_))));
        assert!(matches!(pack_rows(&data, 4, 1, 6, 0), Err(CaptureError::Malformed(_))));
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let capture = GStreamerCapture::new().unwrap();
        let locator = SourceLocator::parse("/nonexistent/camera-bridge/clip.mp4").unwrap();
        let options = CaptureOptions {
            io_timeout_us: 2_000_000,
            ..Default::default()
        };

        let result = capture.open(&locator, &options, 30);
        assert!(matches!(result, Err(CaptureError::Open { .. })));
    }
}
