//! Scripted transport double shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Request, StatusCode};
use tokio::sync::Notify;

use super::transport::{RawResponse, Transport};
use super::ApiError;

/// What the transport saw for one dispatched request
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<String>,
}

pub enum Reply {
    Respond(StatusCode, String),
    Unreachable,
}

impl Reply {
    pub fn json(status: StatusCode, body: serde_json::Value) -> Self {
        Reply::Respond(status, body.to_string())
    }

    pub fn status(status: StatusCode, body: &str) -> Self {
        Reply::Respond(status, body.to_string())
    }
}

/// Holds a reply back until the test releases it.
#[derive(Default)]
pub struct Gate {
    arrived: Notify,
    release: Notify,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait until the gated request has reached the transport
    pub async fn arrived(&self) {
        self.arrived.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

struct Scripted {
    reply: Reply,
    gate: Option<Arc<Gate>>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(Scripted { reply, gate: None });
    }

    pub fn push_gated(&self, reply: Reply, gate: Arc<Gate>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Scripted { reply, gate: Some(gate) });
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: Request) -> Result<RawResponse, ApiError> {
        let recorded = RecordedRequest {
            method: request.method().clone(),
            path: request.url().path().to_string(),
            authorization: header_str(&request, AUTHORIZATION),
            content_type: header_str(&request, CONTENT_TYPE),
            body: request
                .body()
                .and_then(|b| b.as_bytes())
                .map(|b| String::from_utf8_lossy(b).into_owned()),
        };
        self.requests.lock().unwrap().push(recorded);

        let next = self.replies.lock().unwrap().pop_front();
        let Some(Scripted { reply, gate }) = next else {
            return Err(ApiError::NetworkError("no scripted reply".to_string()));
        };

        if let Some(gate) = gate {
            gate.arrived.notify_one();
            gate.release.notified().await;
        }

        match reply {
            Reply::Respond(status, body) => Ok(RawResponse { status, body }),
            Reply::Unreachable => Err(ApiError::NetworkError("connection refused".to_string())),
        }
    }
}

fn header_str(request: &Request, name: HeaderName) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Profile body as served by `/auth/users/me`
pub fn user_json(id: i64, username: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "username": username,
        "email": format!("{}@example.com", username),
        "is_admin": false,
        "bio": null,
        "created_at": "2024-03-01 10:15:00"
    })
}
