#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the gatekeeper layer
//!
//! These tests run a real axum router with a stand-in authentication layer
//! in front of the gatekeeper and verify that:
//! 1. Unauthenticated requests never reach handlers and get a 401 challenge
//! 2. Responses with a granted authorization decision pass unchanged
//! 3. Unchecked or denied responses are rewritten to 403 and alerted
//! 4. Allow-listed statuses and committed responses are left alone

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use authz_gate::{
    Alert, AuthenticationResult, Authenticator, AuthorizationCheck, ChannelAlertSink, Gatekeeper,
    GatekeeperConfig, GatekeeperLayer, StaticAuthenticator, mark_committed,
};
use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{self, StatusCode, header},
    middleware::{Next, from_fn},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::sync::mpsc;
use tower::ServiceExt;

/// Stand-in for the authentication chain: any `Authorization` header counts.
async fn fake_authn(mut req: Request, next: Next) -> Response {
    if req.headers().contains_key(header::AUTHORIZATION) {
        req.extensions_mut()
            .insert(AuthenticationResult::new("alice", "basic"));
    }
    next.run(req).await
}

async fn granted(State(calls): State<Arc<AtomicUsize>>, check: AuthorizationCheck) -> Response {
    calls.fetch_add(1, Ordering::SeqCst);
    check.grant();
    (StatusCode::OK, "rows").into_response()
}

async fn unchecked() -> Response {
    (StatusCode::OK, [("x-query-id", "q-7")], "leaked rows").into_response()
}

async fn missing() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

async fn redirect() -> Response {
    (
        StatusCode::TEMPORARY_REDIRECT,
        [(header::LOCATION, "http://leader:8081/v2/tasks")],
    )
        .into_response()
}

async fn denied_error(check: AuthorizationCheck) -> Response {
    check.deny();
    (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
}

async fn denied_forbidden(check: AuthorizationCheck) -> Response {
    check.deny();
    (StatusCode::FORBIDDEN, "denied").into_response()
}

async fn streaming() -> Response {
    let mut response = (StatusCode::OK, "partial").into_response();
    mark_committed(&mut response);
    response
}

struct TestApp {
    router: Router,
    alerts: mpsc::Receiver<Alert>,
    calls: Arc<AtomicUsize>,
}

impl TestApp {
    fn drain_alerts(&mut self) -> Vec<Alert> {
        let mut alerts = Vec::new();
        while let Ok(alert) = self.alerts.try_recv() {
            alerts.push(alert);
        }
        alerts
    }
}

fn build_app() -> TestApp {
    let cfg = GatekeeperConfig {
        host: "broker-1".to_owned(),
        ..GatekeeperConfig::default()
    };
    let authenticators: Vec<Arc<dyn Authenticator>> = vec![
        Arc::new(StaticAuthenticator::new("basic", Some("Basic".to_owned()))),
        Arc::new(StaticAuthenticator::new("bearer", Some("Bearer".to_owned()))),
        Arc::new(StaticAuthenticator::new("allow-all", None)),
    ];
    let (sink, alerts) = ChannelAlertSink::new(16);
    let gatekeeper = Gatekeeper::new(&cfg, &authenticators, Arc::new(sink)).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let router = Router::new()
        .route("/v2/granted", get(granted))
        .route("/v2/unchecked", get(unchecked))
        .route("/v2/missing", get(missing))
        .route("/v2/redirect", get(redirect))
        .route("/v2/denied-error", get(denied_error))
        .route("/v2/denied-forbidden", get(denied_forbidden))
        .route("/v2/streaming", get(streaming))
        .with_state(calls.clone())
        .layer(GatekeeperLayer::new(Arc::new(gatekeeper)))
        .layer(from_fn(fake_authn));

    TestApp {
        router,
        alerts,
        calls,
    }
}

fn authenticated(uri: &str) -> http::Request<Body> {
    let mut req = http::Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, "Basic YWxpY2U6c2VjcmV0")
        .body(Body::empty())
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 9], 40112))));
    req
}

async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn unauthenticated_request_gets_challenge() -> Result<()> {
    let mut app = build_app();

    let response = app
        .router
        .clone()
        .oneshot(
            http::Request::builder()
                .uri("/v2/granted")
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.calls.load(Ordering::SeqCst), 0, "handler must not run");

    let schemes: Vec<_> = response
        .headers()
        .get_all(header::WWW_AUTHENTICATE)
        .iter()
        .map(|v| v.to_str().unwrap().to_owned())
        .collect();
    assert_eq!(schemes, vec!["Basic".to_owned(), "Bearer".to_owned()]);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json; charset=utf-8"
    );

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await)?;
    assert_eq!(
        body,
        serde_json::json!({
            "error": "Unauthorized",
            "errorMessage": null,
            "errorClass": null,
            "host": "broker-1",
        })
    );
    assert!(app.drain_alerts().is_empty());
    Ok(())
}

#[tokio::test]
async fn granted_response_passes_unchanged() -> Result<()> {
    let mut app = build_app();

    let response = app
        .router
        .clone()
        .oneshot(authenticated("/v2/granted"))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "rows");
    assert_eq!(app.calls.load(Ordering::SeqCst), 1);
    assert!(app.drain_alerts().is_empty());
    Ok(())
}

#[tokio::test]
async fn unchecked_success_becomes_forbidden() -> Result<()> {
    let mut app = build_app();

    let response = app
        .router
        .clone()
        .oneshot(authenticated("/v2/unchecked?limit=10"))
        .await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().get("x-query-id").is_none());
    assert_eq!(body_string(response).await, "");

    let alerts = app.drain_alerts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].message().contains("original response status[200]"));
    assert_eq!(alerts[0].data_str("uri"), Some("/v2/unchecked"));
    assert_eq!(alerts[0].data_str("method"), Some("GET"));
    assert_eq!(alerts[0].data_str("remoteAddr"), Some("10.0.0.9"));
    assert_eq!(alerts[0].data_str("remoteHost"), Some("10.0.0.9"));
    assert_eq!(alerts[0].data_str("queryId"), Some("q-7"));
    Ok(())
}

#[tokio::test]
async fn alert_uri_omits_query_string() -> Result<()> {
    let mut app = build_app();

    let response = app
        .router
        .clone()
        .oneshot(authenticated("/v2/unchecked?token=s3cr3t&sql=select"))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let alerts = app.drain_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].data_str("uri"), Some("/v2/unchecked"));
    assert!(!serde_json::to_string(alerts[0].data())?.contains("s3cr3t"));
    Ok(())
}

#[tokio::test]
async fn unchecked_not_found_and_redirect_pass() -> Result<()> {
    let mut app = build_app();

    let response = app
        .router
        .clone()
        .oneshot(authenticated("/v2/missing"))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .clone()
        .oneshot(authenticated("/v2/redirect"))
        .await?;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "http://leader:8081/v2/tasks"
    );

    assert!(app.drain_alerts().is_empty());
    Ok(())
}

#[tokio::test]
async fn unrouted_path_is_not_found_without_alert() -> Result<()> {
    let mut app = build_app();

    let response = app
        .router
        .clone()
        .oneshot(authenticated("/v2/does-not-exist"))
        .await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.drain_alerts().is_empty());
    Ok(())
}

#[tokio::test]
async fn denied_with_error_status_becomes_forbidden() -> Result<()> {
    let mut app = build_app();

    let response = app
        .router
        .clone()
        .oneshot(authenticated("/v2/denied-error"))
        .await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_string(response).await, "");

    let alerts = app.drain_alerts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].message().contains("status code was not 403"));
    Ok(())
}

#[tokio::test]
async fn denied_with_forbidden_passes() -> Result<()> {
    let mut app = build_app();

    let response = app
        .router
        .clone()
        .oneshot(authenticated("/v2/denied-forbidden"))
        .await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_string(response).await, "denied");
    assert!(app.drain_alerts().is_empty());
    Ok(())
}

#[tokio::test]
async fn committed_response_is_alerted_but_untouched() -> Result<()> {
    let mut app = build_app();

    let response = app
        .router
        .clone()
        .oneshot(authenticated("/v2/streaming"))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "partial");

    let alerts = app.drain_alerts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].message().contains("original response status[200]"));
    Ok(())
}

#[tokio::test]
async fn full_alert_sink_does_not_block_rewrite() -> Result<()> {
    let cfg = GatekeeperConfig::default();
    let (sink, _alerts) = ChannelAlertSink::new(1);
    let gatekeeper = Gatekeeper::new(&cfg, &[], Arc::new(sink))?;
    let router = Router::new()
        .route("/v2/unchecked", get(unchecked))
        .layer(GatekeeperLayer::new(Arc::new(gatekeeper)))
        .layer(from_fn(fake_authn));

    for _ in 0..3 {
        let response = router
            .clone()
            .oneshot(authenticated("/v2/unchecked"))
            .await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
    Ok(())
}
