//! Error types and the error body sent to unauthenticated callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error code carried by the body of a 401 challenge response.
pub const UNAUTHORIZED_ERROR_CODE: &str = "Unauthorized";

/// Error code of the body sent when the gate itself fails.
pub const INTERNAL_ERROR_CODE: &str = "Internal Server Error";

/// Errors the gatekeeper escalates to the pipeline's top-level handler.
///
/// Violations of the authorization invariant are not errors: they are
/// alerted and the response is rewritten in place.
#[derive(Debug, Error)]
pub enum GateError {
    /// The transport refused to reset a response that looked uncommitted.
    #[error("failed to reset response: {0}")]
    ResponseReset(#[source] ResponseError),
}

/// Failures reported by a [`ResponseState`](crate::response::ResponseState).
#[derive(Debug, Error)]
pub enum ResponseError {
    /// Bytes have already been handed to the transport.
    #[error("response already committed")]
    Committed,
}

/// JSON error body used for the 401 challenge.
///
/// Field names follow the query error shape clients already parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryErrorBody {
    pub error: String,
    pub error_message: Option<String>,
    pub error_class: Option<String>,
    pub host: Option<String>,
}

impl QueryErrorBody {
    /// Body for an unauthenticated request: fixed code, no message or class.
    #[must_use]
    pub fn unauthorized(host: &str) -> Self {
        Self {
            error: UNAUTHORIZED_ERROR_CODE.to_owned(),
            error_message: None,
            error_class: None,
            host: Some(host.to_owned()),
        }
    }

    #[must_use]
    pub fn internal(host: &str) -> Self {
        Self {
            error: INTERNAL_ERROR_CODE.to_owned(),
            ..Self::unauthorized(host)
        }
    }
}
