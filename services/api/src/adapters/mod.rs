pub mod db;
pub mod postgrest;
pub mod supabase;

pub use db::DbAdapter;
pub use postgrest::PostgrestProfileStore;
pub use supabase::SupabaseClient;

use std::sync::Arc;
use vidshare_core::{ProfileStore, RemoteService};

/// Builds a fresh set of remote adapters for one browser session.
pub type RemoteFactory = Arc<dyn Fn() -> RemoteService + Send + Sync>;

/// Each call yields a `SupabaseClient` with its own stored session, so tokens are never
/// shared between callers. `profile_db` is shared when set; otherwise profiles go through
/// the hosted table API with the new client's token.
pub fn hosted_remote_factory(
    http: reqwest::Client,
    url: String,
    anon_key: String,
    profile_db: Option<Arc<dyn ProfileStore>>,
) -> RemoteFactory {
    Arc::new(move || {
        let client = Arc::new(SupabaseClient::new(http.clone(), url.clone(), anon_key.clone()));
        let profiles: Arc<dyn ProfileStore> = match profile_db.as_ref() {
            Some(db) => db.clone(),
            None => Arc::new(PostgrestProfileStore::new(client.clone())),
        };
        RemoteService::new(client, profiles)
    })
}
