//! Wire contract with the remote authority.
//!
//! [`RemoteRequest::for_action`] maps a queued action onto a verb, a path and
//! an optional JSON body; a [`RemoteTransport`] delivers it. Any HTTP response,
//! whatever its status, is an `Ok`; only failures to get a response are `Err`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;

use super::action::{format_timestamp, ActionKind, SyncAction};
use crate::error::SyncError;

/// Body field carrying the action's authoring time.
pub const CLIENT_UPDATED_AT_FIELD: &str = "clientUpdatedAt";

/// An HTTP call derived from a queued action.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/api/tasks/5`
    pub path: String,
    pub body: Option<Value>,
}

impl RemoteRequest {
    /// Build the request for `action`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidInput` if an update or delete payload carries
    /// no usable `id`.
    pub fn for_action(action: &SyncAction) -> Result<Self, SyncError> {
        let root = action.entity_type.endpoint_root();

        let path = if action.action.targets_existing() {
            let id = action.entity_id().ok_or_else(|| {
                SyncError::InvalidInput(format!(
                    "{} {} {} has no entity id",
                    action.action, action.entity_type, action.id
                ))
            })?;
            format!("{root}/{id}")
        } else {
            root.to_string()
        };

        let method = match action.action {
            ActionKind::Create => Method::POST,
            ActionKind::Update => Method::PUT,
            ActionKind::Delete => Method::DELETE,
        };

        let body = action.action.has_body().then(|| body_for(action));

        Ok(Self { method, path, body })
    }
}

/// The payload with the authoring timestamp merged in.
///
/// Non-object payloads are sent untouched.
fn body_for(action: &SyncAction) -> Value {
    let mut body = action.payload.clone();
    if let Value::Object(map) = &mut body {
        map.insert(
            CLIENT_UPDATED_AT_FIELD.to_string(),
            Value::String(format_timestamp(&action.client_updated_at)),
        );
    }
    body
}

/// Status and raw body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: String,
}

impl RemoteResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// The remote refused the mutation because its state has diverged.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        self.status == 409
    }

    /// The body as JSON, or `None` if it is empty or malformed.
    #[must_use]
    pub fn json_body(&self) -> Option<Value> {
        if self.body.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }
}

/// Delivers requests to the remote authority.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Perform one request.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Transport` if no HTTP response was received
    /// (connection failure, timeout).
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, SyncError>;
}

/// [`RemoteTransport`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not absolute http(s) or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, SyncError> {
        let base_url = base_url.trim().trim_end_matches('/');
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|e| SyncError::Config(format!("Invalid API base URL '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!(
                "API base URL must be http or https: {base_url}"
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, SyncError> {
        let url = self.url_for(&request.path);
        let mut builder = self.client.request(request.method.clone(), &url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_else(|e| {
            tracing::debug!(%url, error = %e, "failed to read response body");
            String::new()
        });

        tracing::debug!(method = %request.method, %url, status, "remote call finished");
        Ok(RemoteResponse { status, body })
    }
}
