//! Plugin process launching and lifetime ownership.
//!
//! A plugin binary is spawned with piped stdio. Its first stdout line is the
//! handshake (`<port>` or `<host>:<port>`); every line after that, on either
//! stream, is diagnostic output forwarded to the host's diagnostics sink
//! tagged with the plugin name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use groundwork_foundation::{DiagSink, HostError, HostResult, LogEntry, Severity};
use groundwork_plugin_api::handshake::parse_handshake;

/// How a plugin should be spawned.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Display name used to tag diagnostics and errors.
    pub name: String,
    /// Path to the plugin binary.
    pub path: PathBuf,
    /// Arguments; by convention the first is the host's phone-home address.
    pub args: Vec<String>,
    /// Extra environment on top of the parent's.
    pub env: HashMap<String, String>,
    pub handshake_timeout: Duration,
    pub shutdown_timeout: Duration,
}

/// A live plugin process: its handshaked RPC endpoint and its child handle.
///
/// Ownership of the child is exclusive; closing the handle closes the
/// process. `close` is graceful first (the caller is expected to have shut
/// the RPC channel, signalling the plugin to exit) and forceful after the
/// shutdown timeout.
#[derive(Debug)]
pub struct LaunchedPlugin {
    name: String,
    path: PathBuf,
    address: String,
    child: Mutex<Option<Child>>,
    shutdown_timeout: Duration,
}

impl LaunchedPlugin {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The binary this plugin was launched from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The `host:port` endpoint the plugin announced.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Close the plugin process. Idempotent.
    ///
    /// Waits up to the shutdown timeout for a voluntary exit, then kills.
    pub async fn close(&self) -> HostResult<()> {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return Ok(());
        };

        match timeout(self.shutdown_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(plugin = %self.name, ?status, "plugin process exited");
            }
            Ok(Err(e)) => {
                warn!(plugin = %self.name, error = %e, "error waiting for plugin exit");
            }
            Err(_) => {
                warn!(
                    plugin = %self.name,
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "plugin did not exit in time, killing"
                );
                if let Err(e) = child.kill().await {
                    warn!(plugin = %self.name, error = %e, "failed to kill plugin process");
                }
            }
        }
        Ok(())
    }
}

/// Spawn a plugin binary and wait for its handshake.
pub async fn launch(options: LaunchOptions, diag: Arc<dyn DiagSink>) -> HostResult<LaunchedPlugin> {
    let name = options.name.clone();

    debug!(
        plugin = %name,
        path = %options.path.display(),
        args = ?options.args,
        "spawning plugin process"
    );

    let mut child = Command::new(&options.path)
        .args(&options.args)
        .envs(&options.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| HostError::start_failed(&name, e.to_string()))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| HostError::start_failed(&name, "failed to capture stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| HostError::start_failed(&name, "failed to capture stderr"))?;

    // The handshake is the first stdout line.
    let mut stdout_reader = BufReader::new(stdout);
    let mut line = String::new();
    let address = match timeout(options.handshake_timeout, stdout_reader.read_line(&mut line)).await
    {
        Err(_) => {
            kill_quietly(&name, &mut child).await;
            return Err(HostError::handshake_failed(
                &name,
                format!(
                    "no endpoint printed within {}s",
                    options.handshake_timeout.as_secs()
                ),
            ));
        }
        Ok(Err(e)) => {
            kill_quietly(&name, &mut child).await;
            return Err(HostError::start_failed(
                &name,
                format!("failed to read handshake: {e}"),
            ));
        }
        Ok(Ok(0)) => {
            kill_quietly(&name, &mut child).await;
            return Err(HostError::PluginCrashed { name });
        }
        Ok(Ok(_)) => match parse_handshake(&line) {
            Ok(address) => address,
            Err(e) => {
                kill_quietly(&name, &mut child).await;
                return Err(HostError::handshake_failed(&name, e.to_string()));
            }
        },
    };

    debug!(plugin = %name, address = %address, "plugin handshake complete");

    // Keep both streams drained for the life of the process, forwarding each
    // line to the diagnostics sink.
    forward_stream(stdout_reader, name.clone(), false, diag.clone());
    forward_stream(BufReader::new(stderr), name.clone(), true, diag);

    Ok(LaunchedPlugin {
        name,
        path: options.path,
        address,
        child: Mutex::new(Some(child)),
        shutdown_timeout: options.shutdown_timeout,
    })
}

async fn kill_quietly(name: &str, child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(plugin = %name, error = %e, "failed to kill plugin after startup failure");
    }
}

/// Spawn a task that forwards one output stream, line by line, to the sink.
fn forward_stream<R>(reader: BufReader<R>, name: String, is_stderr: bool, diag: Arc<dyn DiagSink>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = reader;
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let severity = if is_stderr {
                        stderr_severity(trimmed)
                    } else {
                        Severity::Info
                    };
                    diag.log(LogEntry::new(severity, format!("{name}: {trimmed}")));
                }
            }
        }
        debug!(plugin = %name, stderr = is_stderr, "plugin output stream closed");
    });
}

/// Stderr lines that look like crashes get error severity, the rest warning.
fn stderr_severity(line: &str) -> Severity {
    let lowered = line.to_lowercase();
    if lowered.contains("error") || lowered.contains("fatal") || lowered.contains("panic") {
        Severity::Error
    } else {
        Severity::Warning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_severity_classifies() {
        assert_eq!(stderr_severity("fatal: broken"), Severity::Error);
        assert_eq!(stderr_severity("ERROR something"), Severity::Error);
        assert_eq!(stderr_severity("still waiting"), Severity::Warning);
    }
}
