//! crates/vidshare_core/src/session.rs
//!
//! The session manager: keeps the in-memory application user consistent with the
//! remote auth session, and provisions a profile the first time an identity signs in.
//!
//! User-initiated operations (`login`, `logout`) propagate remote failures to the caller.
//! Passive resolution (startup, session-change notifications, `refresh`) only logs them,
//! leaving `current_user` unset rather than failing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::{
    ApplicationUser, AuthState, Profile, RemoteUserIdentity, SessionChange, SignupData,
    SignupOutcome,
};
use crate::ports::{AuthService, PortError, ProfileStore};

const SIGNUP_SUCCESS_MSG: &str = "Account created successfully";
const NO_USER_RETURNED_MSG: &str = "Signup failed: no user returned";

//=========================================================================================
// Errors
//=========================================================================================

/// Errors surfaced to callers of user-initiated operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The remote service is not configured. Permanent for the manager's lifetime.
    #[error("Authentication service is unavailable")]
    ServiceUnavailable,
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Remote service error: {0}")]
    Remote(String),
}

//=========================================================================================
// Remote Service Bundle
//=========================================================================================

/// The two halves of the hosted backend the manager talks to.
#[derive(Clone)]
pub struct RemoteService {
    pub auth: Arc<dyn AuthService>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl RemoteService {
    pub fn new(auth: Arc<dyn AuthService>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { auth, profiles }
    }
}

//=========================================================================================
// SessionManager
//=========================================================================================

struct Listener {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the mapping from the remote session to the current `ApplicationUser`.
///
/// Construct one per application instance and share it (e.g. behind an `Arc` in the
/// application state). Call [`SessionManager::start`] once to run the initial session
/// check and subscribe to session changes, and [`SessionManager::stop`] on shutdown.
///
/// Callers must not issue overlapping `login`/`signup`/`logout` calls on one instance.
pub struct SessionManager {
    inner: Arc<Inner>,
    started: AtomicBool,
    listener: Mutex<Option<Listener>>,
}

impl SessionManager {
    /// `None` puts the manager in the permanent "service unavailable" state.
    pub fn new(remote: Option<RemoteService>) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            inner: Arc::new(Inner { remote, state }),
            started: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_available(&self) -> bool {
        self.inner.remote.is_some()
    }

    /// Runs the initial session check, then subscribes to session changes for the
    /// rest of the manager's lifetime. Only the first call has any effect.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let Some(remote) = self.inner.remote.clone() else {
            info!("Remote service not configured; authentication is disabled");
            self.inner.finish_loading();
            return;
        };

        // Subscribe before the initial fetch so no change in between is lost.
        // Queued changes are only handled once the fetch has resolved.
        let changes = remote.auth.subscribe();

        self.inner.reconcile(&remote).await;
        self.inner.finish_loading();

        let token = CancellationToken::new();
        let handle = tokio::spawn(listen(
            self.inner.clone(),
            remote,
            changes,
            token.clone(),
        ));
        *self.listener.lock().await = Some(Listener { token, handle });
        info!("Session manager started");
    }

    /// Unsubscribes from session changes and waits for the listener task to finish.
    pub async fn stop(&self) {
        let listener = self.listener.lock().await.take();
        if let Some(Listener { token, handle }) = listener {
            token.cancel();
            if let Err(e) = handle.await {
                error!("Session listener task failed: {:?}", e);
            }
            info!("Session manager stopped");
        }
    }

    //-------------------------------------------------------------------------------------
    // Operations
    //-------------------------------------------------------------------------------------

    /// Signs in with a password. The current user is populated later, when the
    /// resulting session-change notification has been handled.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), SessionError> {
        let remote = self.remote()?;
        remote
            .auth
            .sign_in_with_password(email.trim(), password)
            .await
            .map_err(|e| {
                warn!("Login rejected by remote service: {}", e);
                SessionError::Authentication(e.message().to_string())
            })?;
        Ok(())
    }

    /// Creates an account and resolves its profile right away. Never fails; the
    /// outcome carries the reason instead.
    pub async fn signup(&self, data: &SignupData) -> SignupOutcome {
        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(e) => return SignupOutcome::failed(e.to_string()),
        };

        let identity = match remote
            .auth
            .sign_up(&data.email, &data.password, &data.metadata())
            .await
        {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                warn!("Signup accepted but no user was returned");
                return SignupOutcome::failed(NO_USER_RETURNED_MSG);
            }
            Err(e) => {
                warn!("Signup rejected by remote service: {}", e);
                return SignupOutcome::failed(e.message());
            }
        };

        let user = self.inner.resolve_profile(remote, &identity).await;
        SignupOutcome {
            success: true,
            message: SIGNUP_SUCCESS_MSG.to_string(),
            user,
        }
    }

    /// Signs out and clears the current user without waiting for the notification.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let remote = self.remote()?;
        remote.auth.sign_out().await.map_err(|e| {
            error!("Logout failed: {}", e);
            SessionError::Remote(e.message().to_string())
        })?;
        self.inner.set_user(None);
        Ok(())
    }

    /// Get-or-create the profile for `identity` and make it the current user.
    /// Failures are logged and yield `None`, leaving the current user unchanged.
    pub async fn resolve_profile(&self, identity: &RemoteUserIdentity) -> Option<ApplicationUser> {
        let remote = self.inner.remote.as_ref()?;
        self.inner.resolve_profile(remote, identity).await
    }

    /// Re-fetches the remote session and reconciles the current user with it.
    pub async fn refresh(&self) -> AuthState {
        if let Some(remote) = self.inner.remote.as_ref() {
            self.inner.reconcile(remote).await;
        }
        self.inner.finish_loading();
        self.state()
    }

    //-------------------------------------------------------------------------------------
    // Accessors
    //-------------------------------------------------------------------------------------

    pub fn current_user(&self) -> Option<ApplicationUser> {
        self.inner.state.borrow().current_user.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Observes every auth state transition.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Resolves once the initial session check has completed.
    pub async fn wait_until_loaded(&self) -> AuthState {
        let mut rx = self.inner.state.subscribe();
        rx.wait_for(|state| !state.loading)
            .await
            .map(|state| state.clone())
            .unwrap_or_else(|_| self.state())
    }

    fn remote(&self) -> Result<&RemoteService, SessionError> {
        self.inner
            .remote
            .as_ref()
            .ok_or(SessionError::ServiceUnavailable)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.token.cancel();
        }
    }
}

//=========================================================================================
// Shared State and Protocols
//=========================================================================================

struct Inner {
    remote: Option<RemoteService>,
    state: watch::Sender<AuthState>,
}

impl Inner {
    fn set_user(&self, user: Option<ApplicationUser>) {
        self.state.send_if_modified(|state| {
            if state.current_user == user {
                return false;
            }
            state.current_user = user;
            true
        });
    }

    fn finish_loading(&self) {
        self.state.send_if_modified(|state| {
            let was_loading = state.loading;
            state.loading = false;
            was_loading
        });
    }

    /// Fetch the remote session and align the current user with it.
    async fn reconcile(&self, remote: &RemoteService) {
        match remote.auth.get_session().await {
            Ok(Some(session)) => {
                self.resolve_profile(remote, &session.user).await;
            }
            Ok(None) => self.set_user(None),
            Err(e) => error!("Failed to fetch the current session: {}", e),
        }
    }

    async fn apply_change(&self, remote: &RemoteService, change: SessionChange) {
        match change.session {
            Some(session) => {
                self.resolve_profile(remote, &session.user).await;
            }
            None => self.set_user(None),
        }
        self.finish_loading();
    }

    async fn resolve_profile(
        &self,
        remote: &RemoteService,
        identity: &RemoteUserIdentity,
    ) -> Option<ApplicationUser> {
        let profile = match remote.profiles.get_profile(&identity.id).await {
            Ok(profile) => profile,
            Err(PortError::NotFound(_)) => {
                info!("No profile for user {}; provisioning one", identity.id);
                self.provision(remote, identity).await?
            }
            Err(e) => {
                error!("Failed to fetch profile for user {}: {}", identity.id, e);
                return None;
            }
        };

        let user = ApplicationUser::from(profile);
        self.set_user(Some(user.clone()));
        Some(user)
    }

    async fn provision(
        &self,
        remote: &RemoteService,
        identity: &RemoteUserIdentity,
    ) -> Option<Profile> {
        let draft = Profile::provision_for(identity);
        match remote.profiles.insert_profile(&draft).await {
            Ok(profile) => Some(profile),
            Err(PortError::Conflict(_)) => {
                // Another resolution for the same identity inserted first.
                warn!(
                    "Profile for user {} already exists; fetching the stored row",
                    identity.id
                );
                match remote.profiles.get_profile(&identity.id).await {
                    Ok(profile) => Some(profile),
                    Err(e) => {
                        error!("Failed to create profile for user {}: {}", identity.id, e);
                        None
                    }
                }
            }
            Err(e) => {
                error!("Failed to create profile for user {}: {}", identity.id, e);
                None
            }
        }
    }
}

/// Handles session-change notifications until cancelled or the channel closes.
async fn listen(
    inner: Arc<Inner>,
    remote: RemoteService,
    mut changes: broadcast::Receiver<SessionChange>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = changes.recv() => match received {
                Ok(change) => {
                    info!("Session change received: {:?}", change.event);
                    inner.apply_change(&remote, change).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Missed {} session changes; reconciling with the remote session", skipped);
                    inner.reconcile(&remote).await;
                    inner.finish_loading();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Session change channel closed");
                    break;
                }
            }
        }
    }
}
