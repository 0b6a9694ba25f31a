use std::path::Path;

use anyhow::Context as _;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for configuration overrides, e.g.
/// `AUTHZ_GATE__QUERY_ID_HEADER=x-request-id`.
pub const ENV_PREFIX: &str = "AUTHZ_GATE__";

fn default_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_owned())
}

fn default_query_id_header() -> String {
    "x-query-id".to_owned()
}

/// Gatekeeper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatekeeperConfig {
    /// Host identity reported in the body of 401 responses.
    #[serde(default = "default_host")]
    pub host: String,

    /// Response header holding the correlation id copied into alerts.
    #[serde(default = "default_query_id_header")]
    pub query_id_header: String,

    /// Registered authentication mechanisms, in chain order.
    #[serde(default)]
    pub authenticators: Vec<AuthenticatorConfig>,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            query_id_header: default_query_id_header(),
            authenticators: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthenticatorConfig {
    pub name: String,
    /// `WWW-Authenticate` value advertised to unauthenticated clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_scheme: Option<String>,
}

impl GatekeeperConfig {
    /// Load configuration from defaults, an optional YAML file, then
    /// environment variables prefixed with [`ENV_PREFIX`].
    ///
    /// # Errors
    /// Returns an error if `path` is given but is not a file, a source cannot
    /// be read, or the merged result does not deserialize.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            anyhow::ensure!(
                path.is_file(),
                "gatekeeper configuration file {} not found",
                path.display()
            );
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("failed to load gatekeeper configuration")
    }
}
