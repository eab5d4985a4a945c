//! The authenticated session.
//!
//! `SessionManager` owns the current-user state and is the only writer of
//! both the durable credential and the credential slot the bearer
//! interceptor reads from. Its lifecycle is `new` → `restore` → (`login` |
//! `register` | `logout`)* → `dispose`.
//!
//! Ordering rules:
//! - a credential is written to the store before the state flips to
//!   authenticated;
//! - `logout` clears the store and the slot before it returns, so nothing
//!   dispatched afterwards carries the old credential;
//! - an operation still in flight when `logout` or `dispose` runs never
//!   applies its result. Each of those bumps a generation counter, and
//!   every write an operation makes is checked against the generation it
//!   started in under the same lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, BearerAuth, CredentialSlot};
use crate::models::{NewAccount, UserProfile};

use super::{CredentialStore, SessionError};

/// Default delay before the first restoration retry; doubles per attempt
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Upper bound on the delay between restoration retries
const MAX_RETRY_BACKOFF_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Restoring,
    Authenticated,
    Anonymous,
}

/// Snapshot of who is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub user: Option<UserProfile>,
    pub authenticated_at: Option<DateTime<Utc>>,
}

impl SessionState {
    fn anonymous() -> Self {
        Self {
            phase: SessionPhase::Anonymous,
            ..Self::default()
        }
    }

    fn authenticated(user: UserProfile) -> Self {
        Self {
            phase: SessionPhase::Authenticated,
            user: Some(user),
            authenticated_at: Some(Utc::now()),
        }
    }

    pub fn is_restoring(&self) -> bool {
        self.phase == SessionPhase::Restoring
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Authenticated
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Extra attempts at resolving the stored credential during restoration
    /// when the API is unreachable or failing. Rejections are never retried.
    pub restore_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            restore_retries: 0,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

pub struct SessionManager {
    client: ApiClient,
    store: Arc<dyn CredentialStore>,
    slot: CredentialSlot,
    state: watch::Sender<SessionState>,
    generation: Mutex<u64>,
    operations: tokio::sync::Mutex<()>,
    options: SessionOptions,
}

impl SessionManager {
    /// Create a session over `client`, registering the bearer interceptor on
    /// its shared chain. Every clone of the client, earlier or later, sends
    /// the session's credential from here on.
    pub fn new(client: ApiClient, store: Arc<dyn CredentialStore>, options: SessionOptions) -> Self {
        let slot = CredentialSlot::new();
        client.add_interceptor(Arc::new(BearerAuth::new(slot.clone())));
        let (state, _) = watch::channel(SessionState::default());

        Self {
            client,
            store,
            slot,
            state,
            generation: Mutex::new(0),
            operations: tokio::sync::Mutex::new(()),
            options,
        }
    }

    /// The shared API client; requests through it carry the active credential
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Read-only view of the credential attached to outbound requests
    pub fn credential(&self) -> CredentialSlot {
        self.slot.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    /// Watch session state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    // ===== Lifecycle =====

    /// Reconcile the stored credential with the API. Always ends in a
    /// definite state: authenticated when the API resolves the user,
    /// anonymous (with the credential erased) otherwise.
    pub async fn restore(&self) -> SessionPhase {
        let generation = self.generation();
        let _op = self.operations.lock().await;

        if self
            .commit(generation, || {
                self.state.send_modify(|s| s.phase = SessionPhase::Restoring);
            })
            .is_none()
        {
            return self.state().phase;
        }

        let token = match self.store.load() {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("No stored credential");
                self.commit(generation, || self.reset());
                return self.state().phase;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential");
                self.commit(generation, || self.reset());
                return self.state().phase;
            }
        };

        if self.commit(generation, || self.slot.set(Some(token))).is_none() {
            return self.state().phase;
        }

        match self.resolve_user().await {
            Ok(user) => {
                self.commit(generation, || {
                    info!(user_id = user.id, username = %user.username, "Session restored");
                    self.state.send_replace(SessionState::authenticated(user));
                });
            }
            Err(e) => {
                warn!(error = %e, "Stored credential could not be validated, signing out");
                self.commit(generation, || self.reset());
            }
        }
        self.state().phase
    }

    /// Sign in with an identifier/secret pair
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<UserProfile, SessionError> {
        let generation = self.generation();
        let _op = self.operations.lock().await;
        self.sign_in(generation, identifier, secret).await
    }

    /// Create an account and sign in as it
    pub async fn register(&self, username: &str, email: &str, secret: &str) -> Result<UserProfile, SessionError> {
        self.register_account(NewAccount {
            username: username.to_string(),
            email: email.to_string(),
            password: secret.to_string(),
            bio: None,
        })
        .await
    }

    /// Create an account and sign in with its email and password.
    /// A failed sign-in surfaces as [`SessionError::AutoLogin`]; the account
    /// still exists and a later `login` can be retried on its own.
    pub async fn register_account(&self, account: NewAccount) -> Result<UserProfile, SessionError> {
        let generation = self.generation();
        let _op = self.operations.lock().await;

        let created = self
            .client
            .create_account(&account)
            .await
            .map_err(SessionError::Registration)?;
        info!(user_id = created.id, username = %created.username, "Account created");

        self.sign_in(generation, &account.email, &account.password)
            .await
            .map_err(|e| match e {
                SessionError::Login(api) => SessionError::AutoLogin(api),
                other => other,
            })
    }

    /// Forget the credential and the user. Synchronous and infallible;
    /// pending operations will not apply their results afterwards.
    pub fn logout(&self) {
        let mut generation = self.lock_generation();
        *generation += 1;
        self.reset();
        info!("Signed out");
    }

    /// End the in-memory session, leaving the stored credential in place
    /// for the next start.
    pub fn dispose(&self) {
        let mut generation = self.lock_generation();
        *generation += 1;
        self.slot.set(None);
        self.state.send_replace(SessionState::default());
        debug!("Session disposed");
    }

    // ===== Internals =====

    async fn sign_in(&self, generation: u64, identifier: &str, secret: &str) -> Result<UserProfile, SessionError> {
        let token = self
            .client
            .issue_token(identifier, secret)
            .await
            .map_err(SessionError::Login)?;

        let previous = self
            .commit(generation, || -> Result<Previous, SessionError> {
                let previous = Previous {
                    stored: self.store.load().map_err(SessionError::Storage)?,
                    attached: self.slot.current(),
                };
                self.store.save(&token).map_err(SessionError::Storage)?;
                self.slot.set(Some(token));
                Ok(previous)
            })
            .ok_or(SessionError::Superseded)??;

        match self.client.current_user().await {
            Ok(user) => self
                .commit(generation, || {
                    info!(user_id = user.id, username = %user.username, "Login successful");
                    self.state.send_replace(SessionState::authenticated(user.clone()));
                    user
                })
                .ok_or(SessionError::Superseded),
            Err(e) => {
                warn!(error = %e, "Token issued but user could not be resolved");
                self.commit(generation, || self.reinstate(previous));
                Err(SessionError::Login(e))
            }
        }
    }

    /// Current-user lookup with the restoration retry policy
    async fn resolve_user(&self) -> Result<UserProfile, ApiError> {
        let mut attempt = 0;
        let mut backoff = self.options.retry_backoff;

        loop {
            match self.client.current_user().await {
                Err(e) if e.is_transient() && attempt < self.options.restore_retries => {
                    attempt += 1;
                    warn!(error = %e, retry = attempt, backoff_ms = backoff.as_millis() as u64, "API unavailable, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                }
                result => return result,
            }
        }
    }

    /// Put back the stored and attached credentials from before a failed
    /// sign-in. They differ before restoration, when a stored token has not
    /// been attached yet.
    fn reinstate(&self, previous: Previous) {
        let result = match previous.stored.as_deref() {
            Some(token) => self.store.save(token),
            None => self.store.clear(),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to restore previous credential");
        }
        self.slot.set(previous.attached);
    }

    /// Erase credential and user. Store is cleared before the slot so no
    /// later request can pick the old credential back up.
    fn reset(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored credential");
        }
        self.slot.set(None);
        self.state.send_replace(SessionState::anonymous());
    }

    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generation(&self) -> u64 {
        *self.lock_generation()
    }

    /// Run `apply` only if no logout/dispose happened since `generation`
    fn commit<R>(&self, generation: u64, apply: impl FnOnce() -> R) -> Option<R> {
        let current = self.lock_generation();
        if *current != generation {
            debug!("Discarding result of superseded session operation");
            return None;
        }
        let result = apply();
        drop(current);
        Some(result)
    }
}

/// Credentials in place before a sign-in replaced them
struct Previous {
    stored: Option<String>,
    attached: Option<String>,
}

fn next_backoff(current: Duration) -> Duration {
    current
        .saturating_mul(2)
        .min(Duration::from_secs(MAX_RETRY_BACKOFF_SECS))
}
