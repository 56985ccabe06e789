pub mod peer_session;

pub use peer_session::{ConnectionState, NegotiationState, PeerSession, Transition};
