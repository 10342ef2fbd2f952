//! crates/vidshare_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the session core.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the hosted auth/database service it talks to.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::{Profile, RemoteUserIdentity, Session, SessionChange, UserMetadata};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., HTTP, database).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// The remote store has no row for the requested key.
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The row already exists (duplicate key on insert).
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// The message reported by the remote service, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            PortError::NotFound(msg)
            | PortError::Conflict(msg)
            | PortError::Unauthorized(msg)
            | PortError::Unexpected(msg) => msg,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Fetches the current session, if one is active.
    async fn get_session(&self) -> PortResult<Option<Session>>;

    /// Registers for every future session change (sign-in, sign-out, token refresh).
    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<SessionChange>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<Session>;

    /// Creates an account. `Ok(None)` means the service accepted the request
    /// but handed back no identity.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> PortResult<Option<RemoteUserIdentity>>;

    async fn sign_out(&self) -> PortResult<()>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Returns `PortError::NotFound` when no profile has this id.
    async fn get_profile(&self, id: &str) -> PortResult<Profile>;

    /// Returns `PortError::Conflict` when a profile with this id already exists.
    async fn insert_profile(&self, profile: &Profile) -> PortResult<Profile>;
}
