//! The gatekeeper: last check before a response leaves the server.
//!
//! Every request must carry an authentication result before it reaches the
//! downstream pipeline, and must have recorded an authorization decision by
//! the time the pipeline returns. Requests without authentication get a 401
//! challenge. Responses that skipped authorization, or were denied without a
//! 403, are alerted and rewritten to a bare 403 while that is still possible.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};

use crate::alert::{Alert, AlertSink};
use crate::authenticator::{Authenticator, StaticAuthenticator, supported_challenge_schemes};
use crate::config::GatekeeperConfig;
use crate::context::RequestContext;
use crate::error::{GateError, QueryErrorBody};
use crate::response::{ResponseState, send_json_error};

/// What the post-check did to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCheckOutcome {
    /// Invariant held; response untouched.
    Passed,
    /// Invariant violated; alert emitted and response replaced by a 403.
    Rewritten,
    /// Invariant violated on a committed response; only the alert was emitted.
    AlertedOnly,
}

/// Whether a response with this status must not leave without an
/// authorization check.
///
/// 404 passes so that "denied" and "does not exist" look the same to the
/// caller. 307 passes because redirects to the leader are authorized on the
/// node they point to.
#[must_use]
pub fn status_should_be_hidden(status: StatusCode) -> bool {
    !matches!(
        status,
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::TEMPORARY_REDIRECT
    )
}

/// Pre-response authorization gate shared by all requests.
pub struct Gatekeeper {
    challenge_schemes: Vec<HeaderValue>,
    unauthorized_body: String,
    internal_error_body: String,
    query_id_header: HeaderName,
    alert_sink: Arc<dyn AlertSink>,
}

impl std::fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("challenge_schemes", &self.challenge_schemes)
            .field("unauthorized_body", &self.unauthorized_body)
            .field("query_id_header", &self.query_id_header)
            .finish_non_exhaustive()
    }
}

impl Gatekeeper {
    /// Build a gatekeeper for an explicit authenticator list.
    ///
    /// Host identity and correlation header come from `cfg`; its
    /// `authenticators` list is not consulted.
    ///
    /// # Errors
    /// Returns an error if a challenge scheme is not a valid header value or
    /// the correlation header name is invalid.
    pub fn new(
        cfg: &GatekeeperConfig,
        authenticators: &[Arc<dyn Authenticator>],
        alert_sink: Arc<dyn AlertSink>,
    ) -> anyhow::Result<Self> {
        let challenge_schemes = supported_challenge_schemes(authenticators)
            .into_iter()
            .map(|scheme| {
                HeaderValue::try_from(scheme.as_str())
                    .with_context(|| format!("invalid challenge scheme '{scheme}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let query_id_header = HeaderName::try_from(cfg.query_id_header.as_str())
            .with_context(|| format!("invalid query id header '{}'", cfg.query_id_header))?;

        let unauthorized_body = serde_json::to_string(&QueryErrorBody::unauthorized(&cfg.host))
            .context("failed to serialize unauthorized error body")?;
        let internal_error_body = serde_json::to_string(&QueryErrorBody::internal(&cfg.host))
            .context("failed to serialize internal error body")?;

        Ok(Self {
            challenge_schemes,
            unauthorized_body,
            internal_error_body,
            query_id_header,
            alert_sink,
        })
    }

    /// JSON body for a 500 answered when the gate cannot enforce itself.
    #[must_use]
    pub fn internal_error_body(&self) -> &str {
        &self.internal_error_body
    }

    /// Build a gatekeeper whose authenticators are the ones listed in `cfg`.
    ///
    /// # Errors
    /// Same as [`Gatekeeper::new`].
    pub fn from_config(
        cfg: &GatekeeperConfig,
        alert_sink: Arc<dyn AlertSink>,
    ) -> anyhow::Result<Self> {
        let authenticators: Vec<Arc<dyn Authenticator>> = cfg
            .authenticators
            .iter()
            .map(|a| Arc::new(StaticAuthenticator::from(a)) as Arc<dyn Authenticator>)
            .collect();
        Self::new(cfg, &authenticators, alert_sink)
    }

    /// Run `next` between the authentication pre-check and the authorization
    /// post-check.
    ///
    /// Without an authentication result `next` is never called and a 401
    /// challenge is returned instead.
    ///
    /// # Errors
    /// Returns [`GateError::ResponseReset`] if a violating response could not
    /// be reset even though it was not committed.
    pub async fn intercept<R, F, Fut>(
        &self,
        request: &RequestContext,
        next: F,
    ) -> Result<R, GateError>
    where
        R: ResponseState + Default,
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        if request.authentication().is_none() {
            tracing::debug!(
                method = %request.method(),
                uri = request.uri(),
                "No authentication result on request, sending challenge"
            );
            let mut response = R::default();
            self.write_challenge(&mut response);
            return Ok(response);
        }

        let mut response = next().await;
        self.post_check(request, &mut response)?;
        Ok(response)
    }

    /// Write the 401 challenge: one `WWW-Authenticate` header per distinct
    /// scheme plus the unauthorized JSON body.
    pub fn write_challenge<R: ResponseState>(&self, response: &mut R) {
        for scheme in &self.challenge_schemes {
            response.append_header(header::WWW_AUTHENTICATE, scheme.clone());
        }
        send_json_error(response, StatusCode::UNAUTHORIZED, &self.unauthorized_body);
    }

    /// Check the recorded authorization decision against the final status.
    ///
    /// Running it again on a response it passed or rewrote is a no-op.
    ///
    /// # Errors
    /// See [`Gatekeeper::enforce_forbidden`].
    pub fn post_check<R: ResponseState>(
        &self,
        request: &RequestContext,
        response: &mut R,
    ) -> Result<PostCheckOutcome, GateError> {
        let status = response.status();
        match request.authorization().decision() {
            None if status_should_be_hidden(status) => {
                let message = format!(
                    "Request did not have an authorization check performed, original response status[{}].",
                    status.as_u16()
                );
                self.enforce_forbidden(&message, request, response)
            }
            Some(false) if status != StatusCode::FORBIDDEN => self.enforce_forbidden(
                "Request's authorization check failed but status code was not 403.",
                request,
                response,
            ),
            _ => Ok(PostCheckOutcome::Passed),
        }
    }

    /// Alert on a violation and replace the response with a bare 403.
    ///
    /// A committed response is left as it is: un-sending bytes would break
    /// intermediaries relaying this server's responses, so the alert is the
    /// only record of the violation.
    ///
    /// # Errors
    /// Returns [`GateError::ResponseReset`] if the reset itself fails.
    pub fn enforce_forbidden<R: ResponseState>(
        &self,
        message: &str,
        request: &RequestContext,
        response: &mut R,
    ) -> Result<PostCheckOutcome, GateError> {
        let query_id = response
            .header(&self.query_id_header)
            .and_then(|v| v.to_str().ok());

        let alert = Alert::new(message)
            .add_data("uri", Some(request.uri()))
            .add_data("method", Some(request.method().as_str()))
            .add_data("remoteAddr", request.remote_addr())
            .add_data("remoteHost", request.remote_host())
            .add_data("queryId", query_id);

        if let Err(err) = self.alert_sink.emit(alert) {
            tracing::warn!(error = %err, alert = message, "Failed to emit authorization alert");
        }

        if response.is_committed() {
            tracing::debug!(
                uri = request.uri(),
                "Response already committed, leaving it unchanged"
            );
            return Ok(PostCheckOutcome::AlertedOnly);
        }

        response.reset().map_err(GateError::ResponseReset)?;
        response.set_status(StatusCode::FORBIDDEN);
        Ok(PostCheckOutcome::Rewritten)
    }
}
