//! services/api/src/adapters/supabase.rs
//!
//! This module contains the adapter for the hosted auth service. It implements the
//! `AuthService` port from the `core` crate over the service's REST endpoints, keeps
//! the current session in memory, and broadcasts every session change.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use vidshare_core::domain::{
    RemoteUserIdentity, Role, Session, SessionChange, SessionEvent, UserMetadata,
};
use vidshare_core::ports::{AuthService, PortError, PortResult};

const SESSION_CHANNEL_CAPACITY: usize = 64;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A client for the hosted backend. Owns the current session and the
/// session-change channel; the profile store borrows its credentials.
pub struct SupabaseClient {
    http: reqwest::Client,
    url: String,
    anon_key: String,
    session: RwLock<Option<Session>>,
    changes: broadcast::Sender<SessionChange>,
}

impl SupabaseClient {
    /// Creates a new `SupabaseClient`. `url` is the project base URL without a trailing slash.
    pub fn new(http: reqwest::Client, url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(SESSION_CHANNEL_CAPACITY);
        Self {
            http,
            url: url.into(),
            anon_key: anon_key.into(),
            session: RwLock::new(None),
            changes,
        }
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.url, table)
    }

    fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{}", self.url, endpoint)
    }

    /// The bearer token for table requests: the signed-in user's token, or the anon key.
    pub(crate) async fn bearer_token(&self) -> String {
        match self.session.read().await.as_ref() {
            Some(session) => session.access_token.clone(),
            None => self.anon_key.clone(),
        }
    }

    async fn replace_session(&self, event: SessionEvent, session: Option<Session>) {
        *self.session.write().await = session.clone();
        // No subscribers is fine; the change is simply not observed.
        let _ = self.changes.send(SessionChange { event, session });
    }

    async fn token_request(&self, grant_type: &str, body: Value) -> PortResult<Session> {
        let response = self
            .http
            .post(format!("{}?grant_type={}", self.auth_url("token"), grant_type))
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(auth_error(response).await);
        }

        let record: SessionRecord = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("Malformed session response: {}", e)))?;
        Ok(record.to_domain(Utc::now()))
    }
}

//=========================================================================================
// "Impure" Wire Record Structs
//=========================================================================================

#[derive(Deserialize)]
struct SessionRecord {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: UserRecord,
}
impl SessionRecord {
    fn to_domain(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.to_domain(),
        }
    }
}

#[derive(Deserialize)]
struct UserRecord {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<MetadataRecord>,
}
impl UserRecord {
    fn to_domain(self) -> RemoteUserIdentity {
        RemoteUserIdentity {
            id: self.id,
            email: self.email,
            metadata: self.user_metadata.map(MetadataRecord::to_domain).unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct MetadataRecord {
    first_name: Option<String>,
    last_name: Option<String>,
    role: Option<String>,
}
impl MetadataRecord {
    fn to_domain(self) -> UserMetadata {
        let role = self.role.and_then(|raw| match raw.parse::<Role>() {
            Ok(role) => Some(role),
            Err(e) => {
                warn!("Ignoring declared role: {}", e);
                None
            }
        });
        UserMetadata {
            first_name: self.first_name,
            last_name: self.last_name,
            role,
        }
        .without_blank_names()
    }
}

/// The error body shapes returned by the auth and table endpoints.
#[derive(Deserialize, Default)]
pub(crate) struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
    code: Option<Value>,
}
impl ErrorBody {
    pub(crate) fn message(&self, status: StatusCode) -> String {
        self.error_description
            .as_ref()
            .or(self.msg.as_ref())
            .or(self.message.as_ref())
            .or(self.error.as_ref())
            .cloned()
            .unwrap_or_else(|| format!("Request failed with status {}", status))
    }

    /// The service-specific code, e.g. `PGRST116` or `23505`.
    pub(crate) fn code(&self) -> Option<String> {
        match self.code.as_ref()? {
            Value::String(code) => Some(code.clone()),
            Value::Number(code) => Some(code.to_string()),
            _ => None,
        }
    }
}

pub(crate) async fn read_error(response: Response) -> (StatusCode, ErrorBody) {
    let status = response.status();
    let body = response.json::<ErrorBody>().await.unwrap_or_default();
    (status, body)
}

pub(crate) fn transport_error(e: reqwest::Error) -> PortError {
    PortError::Unexpected(format!("Request to hosted service failed: {}", e))
}

async fn auth_error(response: Response) -> PortError {
    let (status, body) = read_error(response).await;
    classify_auth_error(status, &body)
}

fn classify_auth_error(status: StatusCode, body: &ErrorBody) -> PortError {
    let message = body.message(status);
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::UNPROCESSABLE_ENTITY => {
            PortError::Unauthorized(message)
        }
        _ => PortError::Unexpected(message),
    }
}

/// Signup answers with a full session when accounts are auto-confirmed, and with the
/// bare user (or `{user, session: null}`) while email confirmation is pending.
fn parse_signup(
    body: Value,
    now: DateTime<Utc>,
) -> PortResult<(Option<Session>, Option<RemoteUserIdentity>)> {
    let malformed =
        |e: serde_json::Error| PortError::Unexpected(format!("Malformed signup response: {}", e));

    if body.get("access_token").is_some_and(|v| !v.is_null()) {
        let session = serde_json::from_value::<SessionRecord>(body)
            .map_err(malformed)?
            .to_domain(now);
        let identity = session.user.clone();
        return Ok((Some(session), Some(identity)));
    }

    let user = if body.get("user").is_some_and(|v| !v.is_null()) {
        body["user"].clone()
    } else if body.get("id").is_some_and(|v| !v.is_null()) {
        body
    } else {
        return Ok((None, None));
    };
    let identity = serde_json::from_value::<UserRecord>(user)
        .map_err(malformed)?
        .to_domain();
    Ok((None, Some(identity)))
}

fn metadata_payload(metadata: &UserMetadata) -> Value {
    let mut data = Map::new();
    if let Some(first_name) = &metadata.first_name {
        data.insert("first_name".to_string(), json!(first_name));
    }
    if let Some(last_name) = &metadata.last_name {
        data.insert("last_name".to_string(), json!(last_name));
    }
    if let Some(role) = metadata.role {
        data.insert("role".to_string(), json!(role.as_str()));
    }
    Value::Object(data)
}

//=========================================================================================
// `AuthService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthService for SupabaseClient {
    /// Returns the stored session, refreshing it first when it has expired.
    async fn get_session(&self) -> PortResult<Option<Session>> {
        let current = self.session.read().await.clone();
        let Some(session) = current else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            info!("Stored session expired without a refresh token; signing out locally");
            self.replace_session(SessionEvent::SignedOut, None).await;
            return Ok(None);
        };

        match self
            .token_request("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
        {
            Ok(refreshed) => {
                info!("Session token refreshed for user {}", refreshed.user.id);
                self.replace_session(SessionEvent::TokenRefreshed, Some(refreshed.clone()))
                    .await;
                Ok(Some(refreshed))
            }
            Err(PortError::Unauthorized(msg)) => {
                warn!("Refresh token rejected ({}); signing out locally", msg);
                self.replace_session(SessionEvent::SignedOut, None).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<Session> {
        let session = self
            .token_request("password", json!({ "email": email, "password": password }))
            .await?;
        self.replace_session(SessionEvent::SignedIn, Some(session.clone()))
            .await;
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> PortResult<Option<RemoteUserIdentity>> {
        let response = self
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&json!({
                "email": email,
                "password": password,
                "data": metadata_payload(metadata),
            }))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(auth_error(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("Malformed signup response: {}", e)))?;
        let (session, identity) = parse_signup(body, Utc::now())?;

        if let Some(session) = session {
            self.replace_session(SessionEvent::SignedIn, Some(session)).await;
        }
        Ok(identity)
    }

    async fn sign_out(&self) -> PortResult<()> {
        let current = self.session.read().await.clone();
        if let Some(session) = current {
            let response = self
                .http
                .post(self.auth_url("logout"))
                .header("apikey", &self.anon_key)
                .bearer_auth(&session.access_token)
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            // An already-invalid token still ends the local session.
            if !status.is_success()
                && status != StatusCode::UNAUTHORIZED
                && status != StatusCode::NOT_FOUND
            {
                let (status, body) = read_error(response).await;
                return Err(PortError::Unexpected(body.message(status)));
            }
        }

        self.replace_session(SessionEvent::SignedOut, None).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_json(id: &str, token: &str) -> Value {
        json!({
            "access_token": token,
            "refresh_token": "refresh-1",
            "expires_in": 3600,
            "token_type": "bearer",
            "user": {
                "id": id,
                "email": "a@x.com",
                "user_metadata": { "first_name": "Ada", "role": "creator" }
            }
        })
    }

    async fn client(server: &MockServer) -> SupabaseClient {
        SupabaseClient::new(reqwest::Client::new(), server.uri(), "anon-key")
    }

    #[tokio::test]
    async fn sign_in_stores_session_and_broadcasts_it() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", "anon-key"))
            .and(body_partial_json(json!({ "email": "a@x.com" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("u1", "tok-1")))
            .mount(&server)
            .await;
        let client = client(&server).await;
        let mut changes = client.subscribe();

        let session = client.sign_in_with_password("a@x.com", "secret").await.unwrap();

        assert_eq!(session.user.id, "u1");
        assert_eq!(session.user.metadata.first_name.as_deref(), Some("Ada"));
        assert_eq!(session.user.metadata.role, Some(Role::Creator));
        assert!(session.expires_at.is_some());
        assert_eq!(client.bearer_token().await, "tok-1");

        let change = changes.recv().await.unwrap();
        assert_eq!(change.event, SessionEvent::SignedIn);
        assert_eq!(change.session.map(|s| s.user.id), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn sign_in_failure_carries_remote_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })))
            .mount(&server)
            .await;
        let client = client(&server).await;

        let result = client.sign_in_with_password("a@x.com", "wrong").await;

        assert_eq!(
            result.unwrap_err(),
            PortError::Unauthorized("Invalid login credentials".to_string())
        );
        assert_eq!(client.get_session().await.unwrap().map(|s| s.user.id), None);
    }

    #[tokio::test]
    async fn sign_up_with_pending_confirmation_returns_identity_without_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .and(body_partial_json(json!({
                "email": "a@x.com",
                "data": { "first_name": "Ada", "role": "creator" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u1",
                "email": "a@x.com",
                "user_metadata": { "first_name": "Ada", "role": "creator" }
            })))
            .mount(&server)
            .await;
        let client = client(&server).await;
        let metadata = UserMetadata {
            first_name: Some("Ada".to_string()),
            last_name: None,
            role: Some(Role::Creator),
        };

        let identity = client.sign_up("a@x.com", "secret", &metadata).await.unwrap();

        assert_eq!(identity.map(|i| i.id), Some("u1".to_string()));
        assert!(client.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_out_clears_session_even_when_token_is_already_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("u1", "tok-1")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let client = client(&server).await;
        client.sign_in_with_password("a@x.com", "secret").await.unwrap();
        let mut changes = client.subscribe();

        client.sign_out().await.unwrap();

        assert!(client.get_session().await.unwrap().is_none());
        assert_eq!(client.bearer_token().await, "anon-key");
        assert_eq!(changes.recv().await.unwrap().event, SessionEvent::SignedOut);
    }

    #[tokio::test]
    async fn sign_out_server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("u1", "tok-1")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "msg": "boom" })))
            .mount(&server)
            .await;
        let client = client(&server).await;
        client.sign_in_with_password("a@x.com", "secret").await.unwrap();

        let result = client.sign_out().await;

        assert_eq!(result.unwrap_err(), PortError::Unexpected("boom".to_string()));
        assert!(client.get_session().await.unwrap().is_some());
    }

    #[test]
    fn signup_response_shapes() {
        let now = Utc::now();

        let (session, identity) = parse_signup(session_json("u1", "tok"), now).unwrap();
        assert!(session.is_some());
        assert_eq!(identity.map(|i| i.id), Some("u1".to_string()));

        let (session, identity) =
            parse_signup(json!({ "user": { "id": "u2", "email": null }, "session": null }), now)
                .unwrap();
        assert!(session.is_none());
        assert_eq!(identity.map(|i| i.id), Some("u2".to_string()));

        let (session, identity) = parse_signup(json!({ "user": null, "session": null }), now).unwrap();
        assert!(session.is_none());
        assert!(identity.is_none());
    }

    #[test]
    fn unknown_declared_role_is_dropped() {
        let metadata = MetadataRecord {
            first_name: None,
            last_name: None,
            role: Some("superuser".to_string()),
        }
        .to_domain();
        assert_eq!(metadata.role, None);
    }

    #[test]
    fn blank_declared_names_are_dropped() {
        let metadata = MetadataRecord {
            first_name: Some(String::new()),
            last_name: Some(" ".to_string()),
            role: None,
        }
        .to_domain();
        assert_eq!(metadata.first_name, None);
        assert_eq!(metadata.last_name, None);
    }

    #[test]
    fn error_message_falls_back_through_known_fields() {
        let body: ErrorBody = serde_json::from_value(json!({ "msg": "Email rate limit exceeded" })).unwrap();
        assert_eq!(body.message(StatusCode::TOO_MANY_REQUESTS), "Email rate limit exceeded");
        assert_eq!(
            classify_auth_error(StatusCode::TOO_MANY_REQUESTS, &body),
            PortError::Unexpected("Email rate limit exceeded".to_string())
        );

        let empty = ErrorBody::default();
        assert!(empty.message(StatusCode::BAD_GATEWAY).contains("502"));
    }
}
