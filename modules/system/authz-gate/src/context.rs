//! Request-scoped state read by the gatekeeper.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::{Method, StatusCode, request::Parts};
use parking_lot::Mutex;

/// Evidence that an authenticator established the caller's identity.
///
/// Inserted into request extensions by whichever authentication layer ran
/// first. The gatekeeper only checks for its presence.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AuthenticationResult {
    identity: String,
    authenticated_by: String,
    authorizer_name: Option<String>,
    #[serde(default)]
    context: serde_json::Map<String, serde_json::Value>,
}

impl AuthenticationResult {
    #[must_use]
    pub fn new(identity: impl Into<String>, authenticated_by: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            authenticated_by: authenticated_by.into(),
            authorizer_name: None,
            context: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_authorizer(mut self, authorizer_name: impl Into<String>) -> Self {
        self.authorizer_name = Some(authorizer_name.into());
        self
    }

    #[must_use]
    pub fn with_context_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Identity of the caller as reported by the authenticator.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Name of the authenticator that produced this result.
    #[must_use]
    pub fn authenticated_by(&self) -> &str {
        &self.authenticated_by
    }

    #[must_use]
    pub fn authorizer_name(&self) -> Option<&str> {
        self.authorizer_name.as_deref()
    }

    /// Mechanism-specific data attached by the authenticator.
    #[must_use]
    pub fn context(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.context
    }
}

/// Recorded authorization decision for one request.
///
/// Cloning shares the underlying slot, so the copy handed to handlers and the
/// copy kept by the gatekeeper observe the same decision. `None` means no
/// authorization logic ran.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationCheck {
    decision: Arc<Mutex<Option<bool>>>,
}

impl AuthorizationCheck {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of an authorization decision.
    ///
    /// A later call overwrites an earlier one.
    pub fn record(&self, allowed: bool) {
        *self.decision.lock() = Some(allowed);
    }

    pub fn grant(&self) {
        self.record(true);
    }

    pub fn deny(&self) {
        self.record(false);
    }

    #[must_use]
    pub fn decision(&self) -> Option<bool> {
        *self.decision.lock()
    }
}

impl<S> FromRequestParts<S> for AuthorizationCheck
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "AuthorizationCheck not found - gatekeeper layer not configured",
        ))
    }
}

/// Everything the gatekeeper needs to know about a request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    authentication: Option<AuthenticationResult>,
    authorization: AuthorizationCheck,
    uri: String,
    method: Method,
    remote_addr: Option<String>,
    remote_host: Option<String>,
}

impl RequestContext {
    #[must_use]
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    #[must_use]
    pub fn authentication(&self) -> Option<&AuthenticationResult> {
        self.authentication.as_ref()
    }

    #[must_use]
    pub fn authorization(&self) -> &AuthorizationCheck {
        &self.authorization
    }

    /// Request path, without the query string.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    #[must_use]
    pub fn remote_host(&self) -> Option<&str> {
        self.remote_host.as_deref()
    }
}

#[derive(Default)]
pub struct RequestContextBuilder {
    authentication: Option<AuthenticationResult>,
    authorization: Option<AuthorizationCheck>,
    uri: Option<String>,
    method: Option<Method>,
    remote_addr: Option<String>,
    remote_host: Option<String>,
}

impl RequestContextBuilder {
    #[must_use]
    pub fn authentication(mut self, result: AuthenticationResult) -> Self {
        self.authentication = Some(result);
        self
    }

    #[must_use]
    pub fn authentication_opt(mut self, result: Option<AuthenticationResult>) -> Self {
        self.authentication = result;
        self
    }

    /// Share an existing authorization slot instead of creating a new one.
    #[must_use]
    pub fn authorization(mut self, check: AuthorizationCheck) -> Self {
        self.authorization = Some(check);
        self
    }

    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    #[must_use]
    pub fn remote_addr(mut self, remote_addr: impl Into<String>) -> Self {
        self.remote_addr = Some(remote_addr.into());
        self
    }

    #[must_use]
    pub fn remote_host(mut self, remote_host: impl Into<String>) -> Self {
        self.remote_host = Some(remote_host.into());
        self
    }

    #[must_use]
    pub fn build(self) -> RequestContext {
        RequestContext {
            authentication: self.authentication,
            authorization: self.authorization.unwrap_or_default(),
            uri: self.uri.unwrap_or_else(|| "/".to_owned()),
            method: self.method.unwrap_or(Method::GET),
            remote_addr: self.remote_addr,
            remote_host: self.remote_host,
        }
    }
}
