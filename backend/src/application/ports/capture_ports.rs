use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{PixelFormat, SourceLocator};

/// Failures reported by the capture layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to open {locator}: {reason}")]
    Open { locator: String, reason: String },

    #[error("end of stream")]
    EndOfStream,

    #[error("read timed out")]
    Timeout,

    #[error("capture handle is closed")]
    Closed,

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("capture I/O error: {0}")]
    Io(String),
}

/// A frame exactly as the capture layer delivered it
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Tightly packed rows, `width * 3` bytes each
    pub data: Bytes,
}

/// Transport used for the source connection itself (not the viewer side)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTransport {
    #[default]
    Tcp,
    Udp,
}

/// Options handed to the capture layer untouched by the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    pub transport: SourceTransport,
    /// Socket and read timeout in microseconds
    pub io_timeout_us: u64,
    /// Receive buffer size in bytes
    pub buffer_size: u32,
    pub low_latency: bool,
    pub no_buffer: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            transport: SourceTransport::Tcp,
            io_timeout_us: 5_000_000,
            buffer_size: 1_024_000,
            low_latency: true,
            no_buffer: true,
        }
    }
}

/// Port for a live capture handle
///
/// Reads block until a frame is available or the capture layer gives up.
/// Dropping the handle releases the underlying resource.
#[cfg_attr(test, mockall::automock)]
pub trait CaptureHandle: Send {
    fn read(&mut self) -> Result<RawFrame, CaptureError>;
}

/// Port for opening capture handles against a locator
#[cfg_attr(test, mockall::automock)]
pub trait CaptureBackend: Send + Sync {
    /// Open a fresh handle. `frame_rate` is the target capture rate.
    fn open(
        &self,
        locator: &SourceLocator,
        options: &CaptureOptions,
        frame_rate: u32,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError>;
}
