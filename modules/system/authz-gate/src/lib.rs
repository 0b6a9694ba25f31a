#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Pre-response authorization check.
//!
//! A last-resort gate placed after authentication and around every handler.
//! It refuses to run handlers for unauthenticated requests and makes sure no
//! response leaves without a recorded authorization decision:
//!
//! - no [`AuthenticationResult`] on the request: 401 with one
//!   `WWW-Authenticate` header per distinct authenticator scheme;
//! - no decision recorded and a status other than 403, 404 or 307: alert and
//!   rewrite to 403;
//! - decision recorded as denied and a status other than 403: alert and
//!   rewrite to 403.
//!
//! ```ignore
//! let cfg = GatekeeperConfig::load(Some(Path::new("authz-gate.yaml")))?;
//! let gatekeeper = Gatekeeper::from_config(&cfg, Arc::new(TracingAlertSink))?;
//! let router = router.layer(GatekeeperLayer::new(Arc::new(gatekeeper)));
//! ```

pub mod alert;
pub mod authenticator;
pub mod config;
pub mod context;
pub mod error;
pub mod gatekeeper;
pub mod middleware;
pub mod response;

pub use alert::{Alert, AlertError, AlertSink, ChannelAlertSink, TracingAlertSink};
pub use authenticator::{Authenticator, StaticAuthenticator, supported_challenge_schemes};
pub use config::{AuthenticatorConfig, GatekeeperConfig};
pub use context::{AuthenticationResult, AuthorizationCheck, RequestContext};
pub use error::{
    GateError, INTERNAL_ERROR_CODE, QueryErrorBody, ResponseError, UNAUTHORIZED_ERROR_CODE,
};
pub use gatekeeper::{Gatekeeper, PostCheckOutcome, status_should_be_hidden};
pub use middleware::{GatekeeperLayer, GatekeeperService};
pub use response::{
    BufferedResponse, JSON_CONTENT_TYPE, ResponseCommitted, ResponseState, mark_committed,
    send_json_error,
};
