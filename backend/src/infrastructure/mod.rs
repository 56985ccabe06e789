// Infrastructure layer - adapters around the application core
// Driven adapters implement ports; driving adapters call into use cases

use std::sync::Arc;

use crate::application::session::SessionLifecycle;
use crate::application::signaling::SignalingHandler;

pub mod driven;    // Output adapters (capture, encoder, transport, registry)
pub mod driving;   // Input adapters (HTTP)

#[derive(Clone)]
pub struct AppState {
    pub signaling: Arc<SignalingHandler>,
    pub lifecycle: Arc<SessionLifecycle>,
}
