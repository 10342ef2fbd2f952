//! services/api/src/web/sessions.rs
//!
//! Browser sessions. Every browser that signs in gets its own `SessionManager`,
//! keyed by the id carried in the `session` cookie.

use axum::http::{header, HeaderMap};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;
use vidshare_core::SessionManager;

use crate::adapters::RemoteFactory;

pub const SESSION_COOKIE: &str = "session";

/// Extracts the session id from the request's `Cookie` header.
pub fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

pub fn session_cookie(id: &str) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/",
        SESSION_COOKIE, id
    )
}

pub fn cleared_session_cookie() -> String {
    format!(
        "{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0",
        SESSION_COOKIE
    )
}

/// The live session managers, one per signed-in browser.
pub struct SessionRegistry {
    factory: Option<RemoteFactory>,
    sessions: RwLock<HashMap<String, Arc<SessionManager>>>,
}

impl SessionRegistry {
    /// `None` means the hosted service is not configured; every session is then disabled.
    pub fn new(factory: Option<RemoteFactory>) -> Self {
        Self {
            factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_available(&self) -> bool {
        self.factory.is_some()
    }

    /// Creates and starts a manager that is not yet bound to a session id.
    pub async fn open(&self) -> Arc<SessionManager> {
        let remote = self.factory.as_ref().map(|factory| factory());
        let session = Arc::new(SessionManager::new(remote));
        session.start().await;
        session
    }

    /// Binds `session` to a new id and returns the id.
    pub async fn insert(&self, session: Arc<SessionManager>) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.write().await.insert(id.clone(), session);
        info!("Opened browser session ({} active)", self.len().await);
        id
    }

    pub async fn get(&self, id: &str) -> Option<Arc<SessionManager>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// The manager bound to the request's session cookie, if any.
    pub async fn lookup(&self, headers: &HeaderMap) -> Option<Arc<SessionManager>> {
        self.get(session_id(headers)?).await
    }

    /// Unbinds `id` and stops its manager.
    pub async fn close(&self, id: &str) {
        let removed = self.sessions.write().await.remove(id);
        if let Some(session) = removed {
            session.stop().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Stops every manager. Called on shutdown.
    pub async fn stop_all(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        for (_, session) in sessions {
            session.stop().await;
        }
    }
}
