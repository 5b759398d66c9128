//! Error handling for the Groundwork plugin host.

use thiserror::Error;

use crate::urn::Urn;

/// Result type alias used throughout the host.
pub type HostResult<T> = Result<T, HostError>;

/// Core error type for plugin lifecycle, RPC, and resource operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HostError {
    #[error("failed to start plugin '{name}': {message}")]
    PluginStartFailed { name: String, message: String },

    #[error("plugin '{name}' handshake failed: {reason}")]
    HandshakeFailed { name: String, reason: String },

    #[error("plugin '{name}' exited before completing its handshake")]
    PluginCrashed { name: String },

    #[error("no {kind} plugin found for '{name}'")]
    PluginNotFound { kind: String, name: String },

    #[error(
        "resource plugin '{name}' version {requested} requested, but {} was found",
        .found.as_deref().map(|v| format!("version {v}")).unwrap_or_else(|| String::from("an unknown version"))
    )]
    VersionMismatch {
        name: String,
        requested: String,
        found: Option<String>,
    },

    #[error("failed to configure resource provider for package '{pkg}': {message}")]
    ProviderConfigurationFailed { pkg: String, message: String },

    #[error("plugin host has been closed")]
    HostClosed,

    #[error("call to '{method}' did not complete before its deadline")]
    DeadlineExceeded { method: String },

    #[error("duplicate resource URN '{0}'")]
    DuplicateUrn(Urn),

    #[error("unknown resource URN '{0}'")]
    UnknownUrn(Urn),

    #[error("plugin load callback failed for '{name}': {message}")]
    PluginCallbackFailed { name: String, message: String },

    #[error("rpc call to '{method}' failed: [{code}] {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error(transparent)]
    Aggregate(#[from] LoadFailures),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl HostError {
    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an RPC failure error.
    pub fn rpc(method: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a spawn failure error.
    pub fn start_failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PluginStartFailed {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a handshake failure error.
    pub fn handshake_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Accumulated failures from loading a batch of plugins.
///
/// `ensure_plugins` keeps going after the first failure so the caller sees
/// every problem in one pass; the result is carried here.
#[derive(Debug, Default)]
pub struct LoadFailures {
    failures: Vec<(String, HostError)>,
}

impl LoadFailures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for the named plugin.
    pub fn push(&mut self, plugin: impl Into<String>, error: HostError) {
        self.failures.push((plugin.into(), error));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// The individual failures, in the order they occurred.
    pub fn failures(&self) -> &[(String, HostError)] {
        &self.failures
    }

    /// `Ok(())` when empty, otherwise the aggregate as an error.
    pub fn into_result(self) -> HostResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.into())
        }
    }
}

impl std::fmt::Display for LoadFailures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} plugin(s) failed to load", self.failures.len())?;
        for (plugin, error) in &self.failures {
            write!(f, "\n  {plugin}: {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for LoadFailures {}
