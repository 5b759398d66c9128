//! The plugin startup handshake.
//!
//! A freshly spawned plugin binds a free local port and prints a single line
//! to stdout: either `<port>` or `<host>:<port>`. Everything after that line
//! is treated as diagnostic output.

use thiserror::Error;

/// Host assumed when the plugin prints only a port.
pub const DEFAULT_PLUGIN_HOST: &str = "127.0.0.1";

/// The handshake line could not be understood.
#[derive(Debug, Error)]
#[error("malformed handshake line {0:?}")]
pub struct HandshakeParseError(pub String);

/// Parse a handshake line into a `host:port` endpoint string.
pub fn parse_handshake(line: &str) -> Result<String, HandshakeParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(HandshakeParseError(line.to_string()));
    }

    match line.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() || port.parse::<u16>().is_err() {
                return Err(HandshakeParseError(line.to_string()));
            }
            Ok(line.to_string())
        }
        None => match line.parse::<u16>() {
            Ok(port) => Ok(format!("{DEFAULT_PLUGIN_HOST}:{port}")),
            Err(_) => Err(HandshakeParseError(line.to_string())),
        },
    }
}
