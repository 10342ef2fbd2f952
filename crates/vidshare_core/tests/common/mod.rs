//! In-memory stand-ins for the hosted auth service and the profiles table.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use vidshare_core::{
    ApplicationUser, AuthService, PortError, PortResult, Profile, ProfileStore, RemoteService,
    RemoteUserIdentity, Role, Session, SessionChange, SessionEvent, SessionManager, UserMetadata,
};

//=========================================================================================
// Fake Auth Service
//=========================================================================================

pub struct FakeAuth {
    accounts: Mutex<HashMap<String, (String, RemoteUserIdentity)>>,
    session: Mutex<Option<Session>>,
    next_user_id: Mutex<Option<String>>,
    changes: broadcast::Sender<SessionChange>,
    pub get_session_calls: AtomicUsize,
    pub sign_in_calls: AtomicUsize,
    pub fail_get_session: AtomicBool,
    pub fail_sign_out: AtomicBool,
    pub sign_up_returns_no_user: AtomicBool,
    pub sign_in_on_sign_up: AtomicBool,
}

impl FakeAuth {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            next_user_id: Mutex::new(None),
            changes,
            get_session_calls: AtomicUsize::new(0),
            sign_in_calls: AtomicUsize::new(0),
            fail_get_session: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            sign_up_returns_no_user: AtomicBool::new(false),
            sign_in_on_sign_up: AtomicBool::new(false),
        }
    }

    pub fn with_account(self, email: &str, password: &str, identity: RemoteUserIdentity) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), identity));
        self
    }

    pub fn with_session(self, identity: RemoteUserIdentity) -> Self {
        *self.session.lock().unwrap() = Some(session_for(identity));
        self
    }

    pub fn set_session(&self, identity: Option<RemoteUserIdentity>) {
        *self.session.lock().unwrap() = identity.map(session_for);
    }

    pub fn with_next_user_id(self, id: &str) -> Self {
        *self.next_user_id.lock().unwrap() = Some(id.to_string());
        self
    }

    pub fn emit(&self, event: SessionEvent, session: Option<Session>) {
        let _ = self.changes.send(SessionChange { event, session });
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn start_session(&self, identity: RemoteUserIdentity) -> Session {
        let session = session_for(identity);
        *self.session.lock().unwrap() = Some(session.clone());
        self.emit(SessionEvent::SignedIn, Some(session.clone()));
        session
    }
}

#[async_trait]
impl AuthService for FakeAuth {
    async fn get_session(&self) -> PortResult<Option<Session>> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get_session.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("connection reset".to_string()));
        }
        Ok(self.session.lock().unwrap().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<Session> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let identity = {
            let accounts = self.accounts.lock().unwrap();
            match accounts.get(email) {
                Some((stored, identity)) if stored == password => identity.clone(),
                _ => {
                    return Err(PortError::Unauthorized(
                        "Invalid login credentials".to_string(),
                    ))
                }
            }
        };
        Ok(self.start_session(identity))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> PortResult<Option<RemoteUserIdentity>> {
        if self.accounts.lock().unwrap().contains_key(email) {
            return Err(PortError::Unexpected("User already registered".to_string()));
        }
        if self.sign_up_returns_no_user.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let id = self
            .next_user_id
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let identity = RemoteUserIdentity {
            id,
            email: Some(email.to_string()),
            metadata: metadata.clone(),
        };
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), identity.clone()));

        if self.sign_in_on_sign_up.load(Ordering::SeqCst) {
            self.start_session(identity.clone());
        }
        Ok(Some(identity))
    }

    async fn sign_out(&self) -> PortResult<()> {
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("network down".to_string()));
        }
        *self.session.lock().unwrap() = None;
        self.emit(SessionEvent::SignedOut, None);
        Ok(())
    }
}

//=========================================================================================
// Fake Profiles Table
//=========================================================================================

pub struct FakeProfiles {
    rows: Mutex<HashMap<String, Profile>>,
    pub inserts: AtomicUsize,
    pub fail_get: AtomicBool,
    pub fail_insert: AtomicBool,
    /// Simulates a concurrent writer: the row appears and the insert reports a conflict.
    pub lose_insert_race: AtomicBool,
}

impl FakeProfiles {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            inserts: AtomicUsize::new(0),
            fail_get: AtomicBool::new(false),
            fail_insert: AtomicBool::new(false),
            lose_insert_race: AtomicBool::new(false),
        }
    }

    pub fn with_row(self, profile: Profile) -> Self {
        self.rows
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile);
        self
    }

    pub fn row(&self, id: &str) -> Option<Profile> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl ProfileStore for FakeProfiles {
    async fn get_profile(&self, id: &str) -> PortResult<Profile> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("permission denied".to_string()));
        }
        self.row(id)
            .ok_or_else(|| PortError::NotFound(format!("Profile {} not found", id)))
    }

    async fn insert_profile(&self, profile: &Profile) -> PortResult<Profile> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("insert rejected".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        if self.lose_insert_race.swap(false, Ordering::SeqCst) {
            let mut winner = profile.clone();
            winner.bio = Some("inserted elsewhere".to_string());
            rows.insert(winner.id.clone(), winner);
            return Err(PortError::Conflict("duplicate key value".to_string()));
        }
        if rows.contains_key(&profile.id) {
            return Err(PortError::Conflict("duplicate key value".to_string()));
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        rows.insert(profile.id.clone(), profile.clone());
        Ok(profile.clone())
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

pub fn identity(id: &str, email: &str, first_name: Option<&str>) -> RemoteUserIdentity {
    RemoteUserIdentity {
        id: id.to_string(),
        email: Some(email.to_string()),
        metadata: UserMetadata {
            first_name: first_name.map(str::to_string),
            last_name: None,
            role: None,
        },
    }
}

pub fn session_for(identity: RemoteUserIdentity) -> Session {
    Session {
        access_token: format!("token-{}", identity.id),
        refresh_token: None,
        expires_at: None,
        user: identity,
    }
}

pub fn profile(id: &str, first_name: &str, last_name: &str) -> Profile {
    Profile {
        id: id.to_string(),
        email: format!("{}@x.com", id),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        role: Role::Viewer,
        is_verified: false,
        avatar_url: None,
        bio: None,
    }
}

pub fn manager(auth: &Arc<FakeAuth>, profiles: &Arc<FakeProfiles>) -> SessionManager {
    SessionManager::new(Some(RemoteService::new(auth.clone(), profiles.clone())))
}

/// Waits (bounded) until the manager's state satisfies `done`.
pub async fn wait_until<F>(manager: &SessionManager, done: F) -> Option<ApplicationUser>
where
    F: FnMut(&vidshare_core::AuthState) -> bool,
{
    let mut rx = manager.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(done))
        .await
        .expect("timed out waiting for auth state")
        .expect("auth state channel closed");
    let user = state.current_user.clone();
    drop(state);
    user
}
