//! API client for communicating with the jobmatch REST API.
//!
//! `ApiClient` is the one shared transport instance of the application.
//! Every request built through it, whether by the session or by any other
//! screen or command, is run through the registered interceptors before it
//! is handed to the transport.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Client, Method, Request, RequestBuilder, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::models::{NewAccount, ProfileUpdate, TokenResponse, UserProfile};

use super::interceptor::RequestInterceptor;
use super::transport::{HttpTransport, RawResponse, Transport};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Token issuance endpoint (form-encoded username/password)
const TOKEN_PATH: &str = "/auth/token";

/// Account creation endpoint
const REGISTER_PATH: &str = "/auth/register";

/// Current-user resolution and profile update endpoint
const CURRENT_USER_PATH: &str = "/auth/users/me";

type InterceptorChain = Arc<RwLock<Vec<Arc<dyn RequestInterceptor>>>>;

/// Clone is cheap - transport, request builder and interceptor chain are all
/// shared behind Arcs. Every clone sees the same interceptor chain.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    builder: Client,
    interceptors: InterceptorChain,
}

impl ApiClient {
    /// Create a client talking HTTP to `base_url`. Without a timeout,
    /// requests wait for the API's own answer or error.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(timeout)?;
        let builder = transport.client().clone();
        Self::build(base_url, Arc::new(transport), builder)
    }

    /// Create a client on top of a custom transport
    pub fn with_transport(base_url: &str, transport: Arc<dyn Transport>) -> Result<Self, ApiError> {
        Self::build(base_url, transport, Client::new())
    }

    fn build(base_url: &str, transport: Arc<dyn Transport>, builder: Client) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid API base URL {}: {}", base_url, e)))?;
        Ok(Self {
            base_url,
            transport,
            builder,
            interceptors: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// Register an interceptor on the shared chain. It applies to every
    /// clone of this client, including clones taken before registration.
    pub fn add_interceptor(&self, interceptor: Arc<dyn RequestInterceptor>) {
        self.interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interceptor);
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a request to `path` (relative to the base URL)
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.builder.request(method, url)
    }

    /// Run the interceptors and send the request. Non-success statuses are
    /// turned into `ApiError`s; nothing is retried.
    pub async fn dispatch(&self, builder: RequestBuilder) -> Result<RawResponse, ApiError> {
        let mut request: Request = builder.build()?;
        let chain = self
            .interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for interceptor in chain.iter() {
            interceptor.intercept(&mut request)?;
        }

        debug!(method = %request.method(), path = request.url().path(), "Dispatching request");
        let response = self.transport.execute(request).await?;

        if response.status.is_success() {
            Ok(response)
        } else {
            debug!(status = %response.status, "Request rejected");
            Err(ApiError::from_status(response.status, &response.body))
        }
    }

    async fn dispatch_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.dispatch(builder).await?;
        serde_json::from_str(&response.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.dispatch_json(self.request(Method::GET, path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.dispatch_json(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.dispatch_json(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.dispatch(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    // ===== Authentication Endpoints =====

    /// Exchange an identifier/secret pair for a bearer token
    pub async fn issue_token(&self, identifier: &str, secret: &str) -> Result<String, ApiError> {
        let builder = self
            .request(Method::POST, TOKEN_PATH)
            .form(&[("username", identifier), ("password", secret)]);
        let token: TokenResponse = self.dispatch_json(builder).await?;

        if token.access_token.is_empty() {
            return Err(ApiError::InvalidResponse("Token response carried an empty token".to_string()));
        }
        Ok(token.access_token)
    }

    /// Create an account. Does not sign in.
    pub async fn create_account(&self, account: &NewAccount) -> Result<UserProfile, ApiError> {
        self.post(REGISTER_PATH, account).await
    }

    /// Resolve the user the attached credential belongs to
    pub async fn current_user(&self) -> Result<UserProfile, ApiError> {
        self.get(CURRENT_USER_PATH).await
    }

    /// Edit the signed-in user's profile
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        self.put(CURRENT_USER_PATH, update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::interceptor::{BearerAuth, CredentialSlot};
    use crate::api::testing::{user_json, Reply, ScriptedTransport};
    use reqwest::StatusCode;

    fn client(transport: &Arc<ScriptedTransport>) -> ApiClient {
        ApiClient::with_transport("http://localhost:8000/", transport.clone()).expect("client")
    }

    #[tokio::test]
    async fn test_issue_token_sends_form() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::json(
            StatusCode::OK,
            serde_json::json!({"access_token": "tok-1", "token_type": "bearer"}),
        ));

        let token = client(&transport)
            .issue_token("alice@example.com", "s3cret")
            .await
            .expect("token");
        assert_eq!(token, "tok-1");

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[0].path, "/auth/token");
        assert_eq!(sent[0].content_type.as_deref(), Some("application/x-www-form-urlencoded"));
        assert_eq!(sent[0].body.as_deref(), Some("username=alice%40example.com&password=s3cret"));
    }

    #[tokio::test]
    async fn test_bad_credentials_are_unauthorized() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::json(
            StatusCode::UNAUTHORIZED,
            serde_json::json!({"detail": "Incorrect username or password"}),
        ));
        let err = client(&transport).issue_token("a", "b").await.unwrap_err();
        assert_eq!(err, ApiError::Unauthorized);
    }

    #[tokio::test]
    async fn test_empty_token_is_invalid() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::json(StatusCode::OK, serde_json::json!({"access_token": ""})));
        let err = client(&transport).issue_token("a", "b").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_create_account_posts_json() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::json(StatusCode::OK, user_json(3, "bob")));

        let account = NewAccount {
            username: "bob".into(),
            email: "bob@example.com".into(),
            password: "pw".into(),
            bio: None,
        };
        let user = client(&transport).create_account(&account).await.expect("account");
        assert_eq!(user.username, "bob");

        let sent = transport.requests();
        assert_eq!(sent[0].path, "/auth/register");
        assert_eq!(sent[0].content_type.as_deref(), Some("application/json"));
        let body: serde_json::Value =
            serde_json::from_str(sent[0].body.as_deref().expect("body")).expect("json body");
        assert_eq!(body["email"], "bob@example.com");
    }

    #[tokio::test]
    async fn test_malformed_profile_is_invalid_response() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::json(StatusCode::OK, serde_json::json!({"unexpected": true})));
        let err = client(&transport).current_user().await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_network_failure_propagates_unchanged() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::Unreachable);
        let err = client(&transport).current_user().await.unwrap_err();
        assert!(matches!(err, ApiError::NetworkError(_)));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_interceptor_applies_to_arbitrary_requests() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::json(StatusCode::OK, serde_json::json!([])));
        transport.push(Reply::status(StatusCode::NO_CONTENT, ""));

        let slot = CredentialSlot::new();
        slot.set(Some("tok-9".to_string()));
        let api = client(&transport);
        api.add_interceptor(Arc::new(BearerAuth::new(slot)));

        let jobs: Vec<serde_json::Value> = api.get("/jobs/").await.expect("jobs");
        assert!(jobs.is_empty());
        api.delete("cv/12").await.expect("delete");

        let sent = transport.requests();
        assert_eq!(sent[1].path, "/cv/12");
        assert!(sent.iter().all(|r| r.authorization.as_deref() == Some("Bearer tok-9")));
    }

    #[tokio::test]
    async fn test_interceptor_reaches_clones_taken_before_registration() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::json(StatusCode::OK, serde_json::json!([])));

        let api = client(&transport);
        let early = api.clone();

        let slot = CredentialSlot::new();
        slot.set(Some("tok-shared".to_string()));
        api.add_interceptor(Arc::new(BearerAuth::new(slot)));

        let _: Vec<serde_json::Value> = early.get("/jobs/").await.expect("jobs");
        assert_eq!(
            transport.requests()[0].authorization.as_deref(),
            Some("Bearer tok-shared")
        );
    }

    #[tokio::test]
    async fn test_unbuildable_request_is_not_transient() {
        let transport = ScriptedTransport::new();
        let api = client(&transport);

        let builder = api.request(Method::GET, "/jobs/").header("x-note", "line\nbreak");
        let err = api.dispatch(builder).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        assert!(!err.is_transient());
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let transport = ScriptedTransport::new();
        assert!(ApiClient::with_transport("not a url", transport).is_err());
    }
}
