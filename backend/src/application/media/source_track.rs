use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::application::ports::{CaptureBackend, CaptureError, CaptureHandle, CaptureOptions, RawFrame};
use crate::domain::errors::BridgeError;
use crate::domain::value_objects::{PixelFormat, SourceLocator, TrackConfig, VideoFrame};

/// Monotonic per-track clock in 90 kHz ticks.
///
/// Advances by one frame period per produced frame, independent of wall time.
#[derive(Debug, Clone)]
struct MediaClock {
    period_ticks: u64,
    next_pts: u64,
}

impl MediaClock {
    fn new(period_ticks: u64) -> Self {
        Self { period_ticks, next_pts: 0 }
    }

    fn tick(&mut self) -> u64 {
        let pts = self.next_pts;
        self.next_pts = self.next_pts.wrapping_add(self.period_ticks);
        pts
    }
}

/// Pull-based frame producer bound to one upstream source.
///
/// Owns at most one capture handle. A failed read releases it and reopens
/// the original locator exactly once before giving up with
/// [`BridgeError::SourceUnavailable`].
pub struct SourceTrack {
    config: TrackConfig,
    locator: SourceLocator,
    options: CaptureOptions,
    backend: Arc<dyn CaptureBackend>,
    handle: Option<Box<dyn CaptureHandle>>,
    clock: MediaClock,
    last_timestamp: Option<u64>,
}

impl SourceTrack {
    /// Open the source. Fails when the very first handle cannot be opened.
    pub fn open(
        backend: Arc<dyn CaptureBackend>,
        locator: SourceLocator,
        options: CaptureOptions,
        config: TrackConfig,
    ) -> Result<Self, BridgeError> {
        let handle = backend
            .open(&locator, &options, config.frame_rate)
            .map_err(|e| unavailable(&locator, &e))?;

        debug!("Opened capture source {} at {}fps", locator, config.frame_rate);

        Ok(Self {
            clock: MediaClock::new(config.period_ticks()),
            config,
            locator,
            options,
            backend,
            handle: Some(handle),
            last_timestamp: None,
        })
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    pub fn locator(&self) -> &SourceLocator {
        &self.locator
    }

    pub fn frame_period(&self) -> Duration {
        self.config.frame_period()
    }

    /// Timestamp of the most recent frame returned
    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Produce the next RGB frame, blocking on the capture layer.
    pub fn produce_frame(&mut self) -> Result<VideoFrame, BridgeError> {
        let raw = match self.read_rgb() {
            Ok(raw) => raw,
            Err(first) => {
                warn!("Read from {} failed ({}), reopening", self.locator, first);
                self.release();
                self.reopen_and_read()?
            }
        };

        let pts = self.clock.tick();
        self.last_timestamp = Some(pts);

        Ok(VideoFrame {
            width: raw.width,
            height: raw.height,
            format: PixelFormat::Rgb24,
            data: raw.data,
            pts,
            duration: self.config.frame_period(),
        })
    }

    /// Drop the capture handle. The next read reopens it.
    pub fn release(&mut self) {
        if self.handle.take().is_some() {
            debug!("Released capture handle for {}", self.locator);
        }
    }

    fn reopen_and_read(&mut self) -> Result<RawFrame, BridgeError> {
        let handle = self
            .backend
            .open(&self.locator, &self.options, self.config.frame_rate)
            .map_err(|e| unavailable(&self.locator, &e))?;
        self.handle = Some(handle);

        self.read_rgb().map_err(|e| {
            self.release();
            unavailable(&self.locator, &e)
        })
    }

    fn read_rgb(&mut self) -> Result<RawFrame, CaptureError> {
        let handle = self.handle.as_mut().ok_or(CaptureError::Closed)?;
        let raw = handle.read()?;
        to_rgb24(raw)
    }
}

impl Drop for SourceTrack {
    fn drop(&mut self) {
        self.release();
    }
}

fn unavailable(locator: &SourceLocator, cause: &CaptureError) -> BridgeError {
    BridgeError::SourceUnavailable {
        locator: locator.to_string(),
        reason: cause.to_string(),
    }
}

/// Convert a packed 24-bit frame to RGB.
fn to_rgb24(raw: RawFrame) -> Result<RawFrame, CaptureError> {
    let expected = raw.width as usize * raw.height as usize * raw.format.bytes_per_pixel();
    if raw.width == 0 || raw.height == 0 || raw.data.len() != expected {
        return Err(CaptureError::Malformed(format!(
            "{}x{} frame carries {} bytes, expected {}",
            raw.width,
            raw.height,
            raw.data.len(),
            expected
        )));
    }

    match raw.format {
        PixelFormat::Rgb24 => Ok(raw),
        PixelFormat::Bgr24 => {
            let mut rgb = raw.data.to_vec();
            for pixel in rgb.chunks_exact_mut(3) {
                pixel.swap(0, 2);
            }
            Ok(RawFrame {
                format: PixelFormat::Rgb24,
                data: rgb.into(),
                ..raw
            })
        }
    }
}
