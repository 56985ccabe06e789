use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::application::ports::{PeerTransport, StateEvents};
use crate::domain::aggregates::{ConnectionState, Transition};
use crate::domain::errors::BridgeError;
use crate::domain::value_objects::SessionId;
use crate::infrastructure::driven::SessionRegistry;

use super::handle::SessionHandle;

/// Owns the per-session state machine and every registry mutation.
///
/// Each session gets one observer task that consumes the transport's state
/// events and the media path's fault reports in order, so transitions of one
/// session never run concurrently.
pub struct SessionLifecycle {
    transport: Arc<dyn PeerTransport>,
    registry: Arc<SessionRegistry>,
}

impl SessionLifecycle {
    pub fn new(transport: Arc<dyn PeerTransport>, registry: Arc<SessionRegistry>) -> Self {
        Self { transport, registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Create a transport session, start observing it and register it.
    pub async fn open_session(self: &Arc<Self>) -> Result<Arc<SessionHandle>, BridgeError> {
        let id = SessionId::generate();
        let (connection, states) = self
            .transport
            .create_session(&id)
            .await
            .map_err(|e| BridgeError::NegotiationFailed(e.to_string()))?;

        let (faults, fault_rx) = mpsc::unbounded_channel();
        let handle = Arc::new(SessionHandle::new(id.clone(), connection, faults));

        if let Err(e) = self.registry.insert(Arc::clone(&handle)).await {
            warn!(session = %id, "Session refused: {}", e);
            handle.shutdown().await;
            return Err(e);
        }

        // Subscribed inside create_session, so no state has been lost yet
        let lifecycle = Arc::clone(self);
        let observed = Arc::clone(&handle);
        tokio::spawn(async move { lifecycle.observe(observed, states, fault_rx).await });

        info!(session = %id, "Session opened");
        Ok(handle)
    }

    /// Close a session: unregister it, stop its media, release its source
    /// and tear down the transport. Closing an unknown or already closed
    /// session does nothing.
    pub async fn close(&self, id: &SessionId) -> bool {
        let Some(handle) = self.registry.remove(id).await else {
            debug!(session = %id, "Session already closed");
            return false;
        };

        let closed = handle.shutdown().await;
        info!(session = %id, "Session closed");
        closed
    }

    /// Close every live session (server shutdown)
    pub async fn close_all(&self) {
        let sessions = self.registry.drain().await;
        if sessions.is_empty() {
            return;
        }

        info!("Closing {} live sessions", sessions.len());
        join_all(sessions.iter().map(|handle| handle.shutdown())).await;
    }

    async fn observe(
        self: Arc<Self>,
        handle: Arc<SessionHandle>,
        mut states: StateEvents,
        mut faults: mpsc::UnboundedReceiver<BridgeError>,
    ) {
        let id = handle.id().clone();
        let cancel = handle.cancellation().clone();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                state = states.recv() => match state {
                    Some(state) => {
                        if self.on_state_change(&handle, state).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        debug!(session = %id, "Transport stopped reporting state");
                        self.close(&id).await;
                        break;
                    }
                },
                Some(fault) = faults.recv() => {
                    if fault.is_media_failure() {
                        error!(session = %id, "Media delivery failed: {}", fault);
                    } else {
                        warn!(session = %id, "Media path stopped: {}", fault);
                    }
                    handle.stop_media().await;
                    handle.observe(ConnectionState::Failed).await;
                    self.close(&id).await;
                    break;
                }
            }
        }

        debug!(session = %id, "Observer finished");
    }

    async fn on_state_change(
        &self,
        handle: &SessionHandle,
        state: ConnectionState,
    ) -> std::ops::ControlFlow<()> {
        use std::ops::ControlFlow;

        let id = handle.id();
        // Frames must stop before the session is seen as failed or closed
        if matches!(state, ConnectionState::Failed | ConnectionState::Closed)
            && !handle.state().await.is_terminal()
        {
            handle.stop_media().await;
        }
        match handle.observe(state).await {
            Transition::Applied { from, to } => {
                info!(session = %id, "Peer connection state changed: {} -> {}", from, to);
            }
            Transition::Unexpected { from, to } => {
                warn!(session = %id, "Unexpected peer connection transition: {} -> {}", from, to);
            }
            Transition::Ignored { from, to } => {
                debug!(session = %id, "Ignoring {} while {}", to, from);
                return ControlFlow::Continue(());
            }
            Transition::Unchanged => return ControlFlow::Continue(()),
        }

        match state {
            ConnectionState::Connected => {
                if let Err(e) = handle.start_media().await {
                    error!(session = %id, "{}", e);
                    handle.observe(ConnectionState::Failed).await;
                    self.close(id).await;
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            }
            ConnectionState::Failed => {
                warn!(session = %id, "Connection failed, closing session");
                self.close(id).await;
                ControlFlow::Break(())
            }
            ConnectionState::Closed => {
                self.close(id).await;
                ControlFlow::Break(())
            }
            _ => ControlFlow::Continue(()),
        }
    }
}
