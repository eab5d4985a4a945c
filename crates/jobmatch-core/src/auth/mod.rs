//! Authentication module for managing the signed-in session.
//!
//! This module provides:
//! - `SessionManager`: owns the current user, performs login/register/logout
//!   and the startup restoration of a persisted credential
//! - `CredentialStore`: durable storage of the bearer token (OS keychain,
//!   a file in the cache directory, or memory)
//!
//! The API decides whether a credential is still valid; nothing here tracks
//! expiry locally.

pub mod credentials;
pub mod error;
pub mod session;

pub use credentials::{CredentialStore, FileStore, KeyringStore, MemoryStore};
pub use error::SessionError;
pub use session::{SessionManager, SessionOptions, SessionPhase, SessionState};
