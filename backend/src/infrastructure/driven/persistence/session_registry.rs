use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::session::SessionHandle;
use crate::domain::errors::BridgeError;
use crate::domain::value_objects::SessionId;

/// In-memory set of live sessions
///
/// All mutations go through one lock; churn is per session, not per frame.
/// Only [`SessionLifecycle`](crate::application::session::SessionLifecycle)
/// adds or removes entries.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    max_sessions: Option<usize>,
}

impl SessionRegistry {
    /// `max_sessions = None` admits any number of sessions
    pub fn new(max_sessions: Option<usize>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn limit(&self) -> Option<usize> {
        self.max_sessions
    }

    /// Admit a session, refusing it when the registry is full
    pub(crate) async fn insert(&self, handle: Arc<SessionHandle>) -> Result<(), BridgeError> {
        let mut sessions = self.sessions.write().await;
        if let Some(limit) = self.max_sessions {
            if sessions.len() >= limit {
                return Err(BridgeError::SessionLimitReached { limit });
            }
        }
        sessions.insert(handle.id().clone(), handle);
        Ok(())
    }

    pub(crate) async fn remove(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id)
    }

    /// Remove every session at once (shutdown)
    pub(crate) async fn drain(&self) -> Vec<Arc<SessionHandle>> {
        let mut sessions = self.sessions.write().await;
        sessions.drain().map(|(_, handle)| handle).collect()
    }

    pub async fn get(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    pub async fn contains(&self, id: &SessionId) -> bool {
        let sessions = self.sessions.read().await;
        sessions.contains_key(id)
    }

    pub async fn list(&self) -> Vec<Arc<SessionHandle>> {
        let sessions = self.sessions.read().await;
        sessions.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::PeerTransport;
    use crate::test_support::FakeTransport;
    use tokio::sync::mpsc;

    async fn handle(transport: &FakeTransport) -> Arc<SessionHandle> {
        let id = SessionId::generate();
        let (connection, _events) = transport.create_session(&id).await.unwrap();
        let (faults, _) = mpsc::unbounded_channel();
        Arc::new(SessionHandle::new(id, connection, faults))
    }

    #[tokio::test]
    async fn test_insert_and_remove() {
        let transport = FakeTransport::new();
        let registry = SessionRegistry::unbounded();
        let session = handle(&transport).await;

        registry.insert(Arc::clone(&session)).await.unwrap();
        assert!(registry.contains(session.id()).await);
        assert_eq!(registry.len().await, 1);

        assert!(registry.remove(session.id()).await.is_some());
        assert!(registry.remove(session.id()).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_admission_limit() {
        let transport = FakeTransport::new();
        let registry = SessionRegistry::new(Some(2));

        registry.insert(handle(&transport).await).await.unwrap();
        registry.insert(handle(&transport).await).await.unwrap();
        let refused = registry.insert(handle(&transport).await).await;

        assert!(matches!(refused, Err(BridgeError::SessionLimitReached { limit: 2 })));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_churn_keeps_membership_consistent() {
        let transport = Arc::new(FakeTransport::new());
        let registry = Arc::new(SessionRegistry::unbounded());

        let mut tasks = Vec::new();
        for i in 0..32 {
            let transport = Arc::clone(&transport);
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let session = handle(&transport).await;
                registry.insert(Arc::clone(&session)).await.unwrap();
                if i % 2 == 0 {
                    registry.remove(session.id()).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.len().await, 16);
        assert_eq!(registry.drain().await.len(), 16);
        assert!(registry.is_empty().await);
    }
}
