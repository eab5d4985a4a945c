//! Data models for the jobmatch API.
//!
//! - `UserProfile`: the signed-in identity returned by `/auth/users/me`
//! - `NewAccount`, `ProfileUpdate`: request payloads
//! - `TokenResponse`: token issuance result

pub mod user;

pub use user::{NewAccount, ProfileUpdate, TokenResponse, UserProfile};
