//! Session persistence seam.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::session::NavigationSession;
use crate::StoreError;

/// Persistence for navigation sessions.
///
/// A deployment would back this with a sessions table; the in-memory
/// implementation serves tests and single-process use.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a new session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the underlying store fails.
    async fn insert(&self, session: &NavigationSession) -> Result<(), StoreError>;

    /// Fetches a session by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the underlying store fails.
    async fn get(&self, session_id: &str) -> Result<Option<NavigationSession>, StoreError>;

    /// Overwrites an existing session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the underlying store fails.
    async fn update(&self, session: &NavigationSession) -> Result<(), StoreError>;
}

/// In-memory session store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<BTreeMap<String, NavigationSession>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: &NavigationSession) -> Result<(), StoreError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| StoreError::new("session store mutex poisoned"))?;
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<NavigationSession>, StoreError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| StoreError::new("session store mutex poisoned"))?;
        Ok(sessions.get(session_id).cloned())
    }

    async fn update(&self, session: &NavigationSession) -> Result<(), StoreError> {
        self.insert(session).await
    }
}
