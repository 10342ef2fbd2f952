//! crates/vidshare_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

const DEFAULT_FIRST_NAME: &str = "User";

//=========================================================================================
// Remote Identity and Session (owned by the hosted auth service)
//=========================================================================================

/// Self-declared metadata supplied at signup time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserMetadata {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
}

impl UserMetadata {
    /// Blank names count as absent, so the provisioning defaults apply.
    pub fn without_blank_names(self) -> Self {
        Self {
            first_name: non_blank(self.first_name),
            last_name: non_blank(self.last_name),
            role: self.role,
        }
    }
}

fn non_blank(name: Option<String>) -> Option<String> {
    name.filter(|n| !n.trim().is_empty())
}

/// The minimal identity record the auth service hands back after authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUserIdentity {
    pub id: String,
    pub email: Option<String>,
    pub metadata: UserMetadata,
}

/// Server-issued proof of authentication. Only observed by this crate.
#[derive(Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: RemoteUserIdentity,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

// Tokens never end up in logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// The kind of transition reported by a session-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// A session-change notification: the event plus the session after it, if any.
#[derive(Debug, Clone)]
pub struct SessionChange {
    pub event: SessionEvent,
    pub session: Option<Session>,
}

//=========================================================================================
// Profile (owned by the application, persisted remotely)
//=========================================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Role {
    Viewer,
    #[default]
    Creator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Creator => "creator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "creator" => Ok(Role::Creator),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// The application-level user record. `id` always equals the originating identity's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_verified: bool,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

impl Profile {
    /// Builds the record inserted the first time an identity is seen without a profile.
    pub fn provision_for(identity: &RemoteUserIdentity) -> Self {
        let metadata = identity.metadata.clone().without_blank_names();
        Self {
            id: identity.id.clone(),
            email: identity.email.clone().unwrap_or_default(),
            first_name: metadata
                .first_name
                .unwrap_or_else(|| DEFAULT_FIRST_NAME.to_string()),
            last_name: metadata.last_name.unwrap_or_default(),
            role: metadata.role.unwrap_or_default(),
            is_verified: true,
            avatar_url: None,
            bio: None,
        }
    }
}

//=========================================================================================
// ApplicationUser (in-memory projection)
//=========================================================================================

/// Display-oriented projection of a `Profile`. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub role: Role,
    pub is_verified: bool,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

impl From<Profile> for ApplicationUser {
    fn from(profile: Profile) -> Self {
        let name = format!("{} {}", profile.first_name, profile.last_name)
            .trim()
            .to_string();
        Self {
            id: profile.id,
            email: profile.email,
            first_name: profile.first_name,
            last_name: profile.last_name,
            name,
            role: profile.role,
            is_verified: profile.is_verified,
            avatar_url: profile.avatar_url,
            bio: profile.bio,
        }
    }
}

/// The auth state published by the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub current_user: Option<ApplicationUser>,
    /// True until the first session check resolves.
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            current_user: None,
            loading: true,
        }
    }
}

//=========================================================================================
// Signup Input / Output
//=========================================================================================

#[derive(Debug, Clone)]
pub struct SignupData {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl SignupData {
    pub fn metadata(&self) -> UserMetadata {
        UserMetadata {
            first_name: Some(self.first_name.clone()),
            last_name: Some(self.last_name.clone()),
            role: Some(self.role),
        }
        .without_blank_names()
    }
}

/// The result of a signup attempt. Signup reports failures here instead of erroring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupOutcome {
    pub success: bool,
    pub message: String,
    pub user: Option<ApplicationUser>,
}

impl SignupOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            user: None,
        }
    }
}
