//! services/api/src/lib.rs
//!
//! The `api` service: adapters for the hosted backend, configuration, and the
//! axum shell that exposes the session manager to the rest of the application.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
