//! Tower layer running the gatekeeper around an axum router.
//!
//! Add it so it wraps everything that may produce a response and sits inside
//! the authentication layers, which insert [`AuthenticationResult`] into
//! request extensions. Handlers and authorizers record their decision through
//! the [`AuthorizationCheck`] extractor.

use std::{
    convert::Infallible,
    future::Future,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::StatusCode,
    response::Response,
};
use tower::{Layer, Service};

use crate::context::{AuthenticationResult, AuthorizationCheck, RequestContext};
use crate::error::GateError;
use crate::gatekeeper::Gatekeeper;
use crate::response::send_json_error;

/// Layer that applies the gatekeeper to services.
///
/// # Example
/// ```ignore
/// router = router.layer(GatekeeperLayer::new(Arc::new(gatekeeper)));
/// ```
#[derive(Clone)]
pub struct GatekeeperLayer {
    gatekeeper: Arc<Gatekeeper>,
}

impl GatekeeperLayer {
    #[must_use]
    pub fn new(gatekeeper: Arc<Gatekeeper>) -> Self {
        Self { gatekeeper }
    }
}

impl<S> Layer<S> for GatekeeperLayer {
    type Service = GatekeeperService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GatekeeperService {
            inner,
            gatekeeper: self.gatekeeper.clone(),
        }
    }
}

/// Service produced by [`GatekeeperLayer`].
#[derive(Clone)]
pub struct GatekeeperService<S> {
    inner: S,
    gatekeeper: Arc<Gatekeeper>,
}

impl<S> Service<Request<Body>> for GatekeeperService<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let gatekeeper = self.gatekeeper.clone();
        let not_ready_inner = self.inner.clone();
        let mut ready_inner = std::mem::replace(&mut self.inner, not_ready_inner);

        Box::pin(async move {
            let ctx = request_context(&mut request);

            let outcome = gatekeeper
                .intercept(&ctx, move || async move {
                    match ready_inner.call(request).await {
                        Ok(response) => response,
                        Err(never) => match never {},
                    }
                })
                .await;

            match outcome {
                Ok(response) => Ok(response),
                Err(err) => Ok(gate_failure_response(&gatekeeper, &ctx, &err)),
            }
        })
    }
}

/// Top-level handling of a [`GateError`]: nothing above this layer can take it.
fn gate_failure_response(
    gatekeeper: &Gatekeeper,
    ctx: &RequestContext,
    err: &GateError,
) -> Response {
    tracing::error!(
        error = %err,
        method = %ctx.method(),
        uri = ctx.uri(),
        "Gatekeeper could not enforce authorization on response"
    );
    let mut response = Response::default();
    send_json_error(
        &mut response,
        StatusCode::INTERNAL_SERVER_ERROR,
        gatekeeper.internal_error_body(),
    );
    response
}

/// Build the gatekeeper's view of `request`, making sure the request carries
/// an [`AuthorizationCheck`] shared with downstream handlers.
fn request_context(request: &mut Request<Body>) -> RequestContext {
    let authorization = if let Some(existing) = request.extensions().get::<AuthorizationCheck>() {
        existing.clone()
    } else {
        let check = AuthorizationCheck::new();
        request.extensions_mut().insert(check.clone());
        check
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let mut builder = RequestContext::builder()
        .authentication_opt(request.extensions().get::<AuthenticationResult>().cloned())
        .authorization(authorization)
        .uri(request.uri().path())
        .method(request.method().clone());
    if let Some(peer) = peer {
        builder = builder.remote_addr(peer.clone()).remote_host(peer);
    }
    builder.build()
}
