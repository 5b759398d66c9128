//! Diagnostics emitted by the host and forwarded from plugins.

use serde::{Deserialize, Serialize};

use crate::urn::Urn;

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

/// A single diagnostic entry.
///
/// This is also the wire payload of the phone-home `engine/log` call: plugins
/// send these to the host, which forwards them to the configured sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub severity: Severity,
    /// Resource the message is about; absent for global messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urn: Option<Urn>,
    pub message: String,
    /// Groups related lines (e.g. one plugin's output stream).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<i32>,
    /// Ephemeral messages may be overwritten by later ones in a UI.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ephemeral: bool,
}

impl LogEntry {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            urn: None,
            message: message.into(),
            stream_id: None,
            ephemeral: false,
        }
    }

    pub fn with_urn(mut self, urn: Urn) -> Self {
        self.urn = Some(urn);
        self
    }
}

/// Sink for diagnostics leaving the engine.
pub trait DiagSink: Send + Sync {
    fn log(&self, entry: LogEntry);
}

/// Default sink that forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagSink for TracingSink {
    fn log(&self, entry: LogEntry) {
        let urn = entry.urn.as_ref().map(Urn::as_str).unwrap_or("");
        match entry.severity {
            Severity::Debug => tracing::debug!(urn = %urn, "{}", entry.message),
            Severity::Info => tracing::info!(urn = %urn, "{}", entry.message),
            Severity::Warning => tracing::warn!(urn = %urn, "{}", entry.message),
            Severity::Error => tracing::error!(urn = %urn, "{}", entry.message),
        }
    }
}
