//! jobmatch-core - client-side session core for the jobmatch API.
//!
//! Provides the shared API client with its request interceptor hook, the
//! durable credential store and the session manager that ties them
//! together.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{SessionError, SessionManager, SessionPhase, SessionState};
pub use config::Config;
