//! Outbound response abstraction.
//!
//! The gatekeeper only needs a handful of operations on a response, and the
//! one that matters most is knowing whether bytes already reached the
//! transport. Once a response is committed it can no longer be reset.

use axum::body::Body;
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode, header};

use crate::error::ResponseError;

/// Content type of JSON error bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Mutable response under construction.
pub trait ResponseState {
    fn status(&self) -> StatusCode;

    /// Set the status code. Ignored once the response is committed.
    fn set_status(&mut self, status: StatusCode);

    fn header(&self, name: &HeaderName) -> Option<&HeaderValue>;

    /// Add a header value, keeping existing values for the same name.
    fn append_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Replace all values of a header.
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Whether bytes have started flowing to the client.
    fn is_committed(&self) -> bool;

    /// Discard status, headers and body.
    ///
    /// # Errors
    /// Returns [`ResponseError::Committed`] if the response was committed.
    fn reset(&mut self) -> Result<(), ResponseError>;

    /// Write `bytes` as the complete response body.
    ///
    /// # Errors
    /// Returns a [`ResponseError`] if the body cannot be written.
    fn write_body(&mut self, bytes: &[u8]) -> Result<(), ResponseError>;
}

/// Sets `status`, JSON content type and `json` as the body.
///
/// A write failure means the connection is gone; it is logged and dropped.
pub fn send_json_error<R: ResponseState>(response: &mut R, status: StatusCode, json: &str) {
    response.set_status(status);
    response.set_header(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    if let Err(err) = response.write_body(json.as_bytes()) {
        tracing::error!(error = %err, "Can't write error body to HTTP response");
    }
}

/// In-memory response with an explicit commit point.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    committed: bool,
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            committed: false,
        }
    }
}

impl BufferedResponse {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Append to the body. Writing after commit keeps streaming.
    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Flush status and headers to the client.
    pub fn commit(&mut self) {
        self.committed = true;
    }
}

impl ResponseState for BufferedResponse {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn set_status(&mut self, status: StatusCode) {
        if !self.committed {
            self.status = status;
        }
    }

    fn header(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        if !self.committed {
            self.headers.append(name, value);
        }
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if !self.committed {
            self.headers.insert(name, value);
        }
    }

    fn is_committed(&self) -> bool {
        self.committed
    }

    fn reset(&mut self) -> Result<(), ResponseError> {
        if self.committed {
            return Err(ResponseError::Committed);
        }
        *self = Self::default();
        Ok(())
    }

    fn write_body(&mut self, bytes: &[u8]) -> Result<(), ResponseError> {
        if self.committed {
            return Err(ResponseError::Committed);
        }
        self.body.clear();
        self.body.extend_from_slice(bytes);
        Ok(())
    }
}

/// Response extension marking that bytes have reached the transport.
///
/// Streaming and proxy layers insert it once they start relaying an upstream
/// response; the gatekeeper then leaves the response untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseCommitted;

/// Mark an axum response as committed.
pub fn mark_committed(response: &mut Response<Body>) {
    response.extensions_mut().insert(ResponseCommitted);
}

impl ResponseState for Response<Body> {
    fn status(&self) -> StatusCode {
        Response::status(self)
    }

    fn set_status(&mut self, status: StatusCode) {
        if !ResponseState::is_committed(self) {
            *self.status_mut() = status;
        }
    }

    fn header(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers().get(name)
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        if !ResponseState::is_committed(self) {
            self.headers_mut().append(name, value);
        }
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if !ResponseState::is_committed(self) {
            self.headers_mut().insert(name, value);
        }
    }

    fn is_committed(&self) -> bool {
        self.extensions().get::<ResponseCommitted>().is_some()
    }

    fn reset(&mut self) -> Result<(), ResponseError> {
        if ResponseState::is_committed(self) {
            return Err(ResponseError::Committed);
        }
        *self = Response::default();
        Ok(())
    }

    fn write_body(&mut self, bytes: &[u8]) -> Result<(), ResponseError> {
        if ResponseState::is_committed(self) {
            return Err(ResponseError::Committed);
        }
        *self.body_mut() = Body::from(bytes.to_vec());
        Ok(())
    }
}
