//! Alerts raised when a response violates the authorization invariant.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// A diagnostic event: message plus structured data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    message: String,
    data: serde_json::Map<String, serde_json::Value>,
}

impl Alert {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: serde_json::Map::new(),
        }
    }

    /// Attach a data field. Absent values are recorded as JSON `null`.
    #[must_use]
    pub fn add_data(mut self, key: &str, value: Option<&str>) -> Self {
        let value = value.map_or(serde_json::Value::Null, |v| {
            serde_json::Value::String(v.to_owned())
        });
        self.data.insert(key.to_owned(), value);
        self
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn data(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.data
    }

    /// String value of a data field, `None` if missing or `null`.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Errors reported by an alert sink.
#[derive(Debug, Error)]
pub enum AlertError {
    /// The sink could not accept the alert without waiting.
    #[error("alert sink is full")]
    Full,

    /// The sink's consumer is gone.
    #[error("alert sink is closed")]
    Closed,
}

/// Destination for alerts.
///
/// Implementations must not block: the gatekeeper calls `emit` on the
/// response path.
pub trait AlertSink: Send + Sync {
    /// Hand an alert to the sink.
    ///
    /// # Errors
    /// Returns [`AlertError`] if the alert could not be accepted.
    fn emit(&self, alert: Alert) -> Result<(), AlertError>;
}

/// Sink that writes alerts as error-level tracing events tagged `alert = true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn emit(&self, alert: Alert) -> Result<(), AlertError> {
        let data = serde_json::Value::Object(alert.data).to_string();
        tracing::error!(alert = true, data = %data, "{}", alert.message);
        Ok(())
    }
}

/// Sink that forwards alerts over a bounded channel to a separate consumer.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::Sender<Alert>,
}

impl ChannelAlertSink {
    /// Create a sink and the receiver the delivery task drains.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelAlertSink {
    fn emit(&self, alert: Alert) -> Result<(), AlertError> {
        self.tx.try_send(alert).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AlertError::Full,
            mpsc::error::TrySendError::Closed(_) => AlertError::Closed,
        })
    }
}
