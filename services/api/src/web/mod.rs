pub mod auth;
pub mod middleware;
pub mod rest;
pub mod sessions;
pub mod state;

// Re-export the router builder so the binary can assemble the server in one call.
pub use middleware::require_auth;
pub use rest::app_router;
