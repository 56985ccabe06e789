// Application layer - signaling and session orchestration
// Depends on the domain layer and on ports implemented by infrastructure

pub mod media;
pub mod ports;
pub mod session;
pub mod signaling;
