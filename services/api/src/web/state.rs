//! services/api/src/web/state.rs
//!
//! Defines the application's shared state: the one context object every handler
//! receives, carrying the per-browser session managers.

use crate::config::Config;
use crate::web::sessions::SessionRegistry;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}
