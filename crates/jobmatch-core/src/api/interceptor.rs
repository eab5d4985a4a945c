//! Request interception for the shared `ApiClient`.
//!
//! Every request the client dispatches passes through its registered
//! interceptors, in registration order, right before it reaches the
//! transport. `BearerAuth` is the one the session installs: it reads the
//! active credential and attaches it as an `Authorization: Bearer` header.

use std::sync::{Arc, PoisonError, RwLock};

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Request;

use super::ApiError;

pub trait RequestInterceptor: Send + Sync {
    /// Adjust an outbound request. Must not have side effects beyond the
    /// request itself.
    fn intercept(&self, request: &mut Request) -> Result<(), ApiError>;
}

/// In-memory copy of the credential currently attached to outbound
/// requests. Cloning shares the slot.
///
/// Only the session writes to it; everything else gets read access.
#[derive(Clone, Default)]
pub struct CredentialSlot {
    inner: Arc<RwLock<Option<String>>>,
}

impl CredentialSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The credential requests are currently sent with, if any
    pub fn current(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn set(&self, token: Option<String>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}

/// Attaches the active credential as a bearer token. Requests go out
/// unauthenticated while no credential is active.
pub struct BearerAuth {
    slot: CredentialSlot,
}

impl BearerAuth {
    pub fn new(slot: CredentialSlot) -> Self {
        Self { slot }
    }
}

impl RequestInterceptor for BearerAuth {
    fn intercept(&self, request: &mut Request) -> Result<(), ApiError> {
        let headers = request.headers_mut();
        match self.slot.current() {
            Some(token) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| ApiError::MalformedCredential)?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            None => {
                headers.remove(AUTHORIZATION);
            }
        }
        Ok(())
    }
}
