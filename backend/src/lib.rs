//! Bridges one camera or file source to many browser viewers over WebRTC.
//!
//! Each viewer's offer becomes a session with its own capture handle and
//! frame pump; the session's connectivity state drives teardown.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
mod test_support;
