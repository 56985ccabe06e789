pub mod frame_pump;
pub mod source_track;

pub use frame_pump::FramePump;
pub use source_track::SourceTrack;
