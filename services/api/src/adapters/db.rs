//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, a concrete implementation of the
//! `ProfileStore` port from the `core` crate. It reads and writes the `profiles`
//! table over a direct PostgreSQL connection using `sqlx`, for deployments that
//! set `PROFILE_DATABASE_URL`.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::warn;
use vidshare_core::domain::{Profile, Role};
use vidshare_core::ports::{PortError, PortResult, ProfileStore};

const UNIQUE_VIOLATION_CODE: &str = "23505";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ProfileStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

//=========================================================================================
// "Impure" Database Record Struct
//=========================================================================================

#[derive(FromRow)]
struct ProfileRecord {
    id: String,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    role: String,
    is_verified: bool,
    avatar_url: Option<String>,
    bio: Option<String>,
}
impl ProfileRecord {
    fn to_domain(self) -> Profile {
        let role = self.role.parse::<Role>().unwrap_or_else(|e| {
            warn!("Profile {} has an invalid role: {}", self.id, e);
            Role::default()
        });
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

fn map_insert_error(e: sqlx::Error) -> PortError {
    let is_duplicate = e
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION_CODE);
    if is_duplicate {
        PortError::Conflict(e.to_string())
    } else {
        PortError::Unexpected(e.to_string())
    }
}

//=========================================================================================
// `ProfileStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProfileStore for DbAdapter {
    async fn get_profile(&self, id: &str) -> PortResult<Profile> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT id, email, first_name, last_name, role, is_verified, avatar_url, bio \
             FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Profile {} not found", id)),
            _ => PortError::Unexpected(e.to_string()),
        })?;

        Ok(record.to_domain())
    }

    async fn insert_profile(&self, profile: &Profile) -> PortResult<Profile> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "INSERT INTO profiles (id, email, first_name, last_name, role, is_verified, avatar_url, bio) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, email, first_name, last_name, role, is_verified, avatar_url, bio",
        )
        .bind(&profile.id)
        .bind(&profile.email)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(profile.role.as_str())
        .bind(profile.is_verified)
        .bind(&profile.avatar_url)
        .bind(&profile.bio)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(record.to_domain())
    }
}
