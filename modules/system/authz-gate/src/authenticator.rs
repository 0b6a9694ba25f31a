//! Authenticators as seen by the gatekeeper.
//!
//! The gatekeeper never authenticates anything. It only needs the challenge
//! scheme each configured mechanism advertises to unauthenticated clients.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::AuthenticatorConfig;

/// A registered authentication mechanism.
pub trait Authenticator: Send + Sync {
    /// Name the mechanism is registered under.
    fn name(&self) -> &str;

    /// Value for a `WWW-Authenticate` header, or `None` if the mechanism
    /// does not challenge clients.
    fn challenge_scheme(&self) -> Option<&str>;
}

/// Authenticator descriptor loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAuthenticator {
    name: String,
    challenge_scheme: Option<String>,
}

impl StaticAuthenticator {
    #[must_use]
    pub fn new(name: impl Into<String>, challenge_scheme: Option<String>) -> Self {
        Self {
            name: name.into(),
            challenge_scheme,
        }
    }
}

impl From<&AuthenticatorConfig> for StaticAuthenticator {
    fn from(cfg: &AuthenticatorConfig) -> Self {
        Self::new(cfg.name.clone(), cfg.challenge_scheme.clone())
    }
}

impl Authenticator for StaticAuthenticator {
    fn name(&self) -> &str {
        &self.name
    }

    fn challenge_scheme(&self) -> Option<&str> {
        self.challenge_scheme.as_deref()
    }
}

/// Distinct challenge schemes advertised by `authenticators`.
///
/// Duplicates collapse; authenticators without a scheme contribute nothing.
/// The result is sorted so header order is stable across requests.
#[must_use]
pub fn supported_challenge_schemes(authenticators: &[Arc<dyn Authenticator>]) -> Vec<String> {
    authenticators
        .iter()
        .filter_map(|a| a.challenge_scheme())
        .map(str::to_owned)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
