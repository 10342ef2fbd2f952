//! services/api/src/adapters/postgrest.rs
//!
//! The hosted table adapter for profiles. Implements the `ProfileStore` port over the
//! service's REST table API, authenticated with the current session's token.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;
use vidshare_core::domain::{Profile, Role};
use vidshare_core::ports::{PortError, PortResult, ProfileStore};

use crate::adapters::supabase::{read_error, transport_error, ErrorBody, SupabaseClient};

const PROFILES_TABLE: &str = "profiles";
/// Asks the table API for a single object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const NO_ROWS_CODE: &str = "PGRST116";
const UNIQUE_VIOLATION_CODE: &str = "23505";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct PostgrestProfileStore {
    client: Arc<SupabaseClient>,
}

impl PostgrestProfileStore {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }
}

//=========================================================================================
// "Impure" Row Struct
//=========================================================================================

#[derive(Serialize, Deserialize)]
struct ProfileRecord {
    id: String,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    role: Option<String>,
    is_verified: bool,
    avatar_url: Option<String>,
    bio: Option<String>,
}
impl ProfileRecord {
    fn from_domain(profile: &Profile) -> Self {
        Self {
            id: profile.id.clone(),
            email: Some(profile.email.clone()),
            first_name: Some(profile.first_name.clone()),
            last_name: Some(profile.last_name.clone()),
            role: Some(profile.role.as_str().to_string()),
            is_verified: profile.is_verified,
            avatar_url: profile.avatar_url.clone(),
            bio: profile.bio.clone(),
        }
    }

    fn to_domain(self) -> Profile {
        let role = match self.role.as_deref().map(str::parse::<Role>) {
            Some(Ok(role)) => role,
            Some(Err(e)) => {
                warn!("Profile {} has an invalid role: {}", self.id, e);
                Role::default()
            }
            None => Role::default(),
        };
        Profile {
            id: self.id,
            email: self.email.unwrap_or_default(),
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            role,
            is_verified: self.is_verified,
            avatar_url: self.avatar_url,
            bio: self.bio,
        }
    }
}

fn classify_table_error(status: StatusCode, body: &ErrorBody) -> PortError {
    let message = body.message(status);
    match body.code().as_deref() {
        Some(NO_ROWS_CODE) => PortError::NotFound(message),
        Some(UNIQUE_VIOLATION_CODE) => PortError::Conflict(message),
        _ => match status {
            StatusCode::CONFLICT => PortError::Conflict(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized(message),
            _ => PortError::Unexpected(message),
        },
    }
}

//=========================================================================================
// `ProfileStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProfileStore for PostgrestProfileStore {
    async fn get_profile(&self, id: &str) -> PortResult<Profile> {
        let response = self
            .client
            .http()
            .get(self.client.rest_url(PROFILES_TABLE))
            .query(&[("id", format!("eq.{}", id)), ("select", "*".to_string())])
            .header("apikey", self.client.anon_key())
            .bearer_auth(self.client.bearer_token().await)
            .header("accept", SINGLE_OBJECT)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let (status, body) = read_error(response).await;
            return Err(classify_table_error(status, &body));
        }

        let record: ProfileRecord = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("Malformed profile row: {}", e)))?;
        Ok(record.to_domain())
    }

    async fn insert_profile(&self, profile: &Profile) -> PortResult<Profile> {
        let response = self
            .client
            .http()
            .post(self.client.rest_url(PROFILES_TABLE))
            .header("apikey", self.client.anon_key())
            .bearer_auth(self.client.bearer_token().await)
            .header("accept", SINGLE_OBJECT)
            .header("prefer", "return=representation")
            .json(&ProfileRecord::from_domain(profile))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let (status, body) = read_error(response).await;
            return Err(classify_table_error(status, &body));
        }

        let record: ProfileRecord = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("Malformed profile row: {}", e)))?;
        Ok(record.to_domain())
    }
}
