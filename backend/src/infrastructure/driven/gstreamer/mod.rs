// GStreamer-backed capture and encoding

pub mod capture;
pub mod vp8;

pub use capture::GStreamerCapture;
pub use vp8::Vp8EncoderFactory;

use anyhow::{Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;

pub(crate) fn init() -> Result<()> {
    gst::init().context("Failed to initialize GStreamer")
}

/// First error message waiting on the pipeline's bus, if any
pub(crate) fn bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let message = pipeline.bus()?.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
        gst::MessageView::Error(err) => Some(match err.debug() {
            Some(debug) => format!("{} ({})", err.error(), debug),
            None => err.error().to_string(),
        }),
        _ => None,
    }
}
