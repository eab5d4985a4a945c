use thiserror::Error;

use crate::api::ApiError;

/// Why a session operation did not complete. The session is left in the
/// state it had before the operation in every case.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Sign-in failed: {0}")]
    Login(ApiError),

    #[error("Registration failed: {0}")]
    Registration(ApiError),

    /// The account exists remotely; signing in again may succeed.
    #[error("Account created, but signing in failed: {0}")]
    AutoLogin(ApiError),

    #[error("Signed out before the operation completed")]
    Superseded,

    #[error("Credential storage failed: {0:#}")]
    Storage(anyhow::Error),
}

impl SessionError {
    /// The remote failure behind this error, if there was one
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            SessionError::Login(e) | SessionError::Registration(e) | SessionError::AutoLogin(e) => Some(e),
            SessionError::Superseded | SessionError::Storage(_) => None,
        }
    }

    /// The API rejected the credential or the identifier/secret pair
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.api_error(), Some(ApiError::Unauthorized))
    }

    /// The API could not be reached or was temporarily failing
    pub fn is_transient(&self) -> bool {
        self.api_error().map(ApiError::is_transient).unwrap_or(false)
    }
}
