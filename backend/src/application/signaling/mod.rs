pub mod handle_offer;

pub use handle_offer::{parse_offer, SignalingHandler, SourceBinding};
