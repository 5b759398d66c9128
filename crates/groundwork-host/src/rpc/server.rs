//! RPC server for services the host exposes to plugins.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, error, info};

use groundwork_foundation::HostResult;
use groundwork_plugin_api::protocol::{
    error_codes, RpcErrorObject, RpcMessage, RpcRequest, RpcResponse,
};

/// Dispatches a decoded request to service logic.
///
/// Returning `Err` produces a JSON-RPC error response; notifications get
/// their errors logged and dropped.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcErrorObject>;
}

/// A line-delimited JSON-RPC server on an ephemeral loopback port.
pub struct RpcServer {
    local_addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl RpcServer {
    /// Bind to an ephemeral port and start accepting connections.
    pub async fn bind(bind_host: &str, handler: Arc<dyn RpcHandler>) -> HostResult<Self> {
        let listener = TcpListener::bind((bind_host, 0)).await?;
        let local_addr = listener.local_addr()?;
        let shutdown = Arc::new(Notify::new());

        let accept_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_shutdown.notified() => {
                        debug!(addr = %local_addr, "rpc server shutting down");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer_addr)) => {
                                debug!(peer = %peer_addr, "rpc connection accepted");
                                let handler = handler.clone();
                                let shutdown = accept_shutdown.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, handler, shutdown).await {
                                        debug!(peer = %peer_addr, error = %e, "rpc connection ended with error");
                                    }
                                });
                            }
                            Err(e) => {
                                error!(error = %e, "failed to accept rpc connection");
                            }
                        }
                    }
                }
            }
            // Listener drops here; no further connections are accepted.
        });

        info!(addr = %local_addr, "rpc server bound");
        Ok(Self {
            local_addr,
            shutdown,
        })
    }

    /// The published `host:port` endpoint.
    pub fn address(&self) -> String {
        self.local_addr.to_string()
    }

    /// Stop accepting connections and close active ones. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

async fn handle_connection(
    stream: TcpStream,
    handler: Arc<dyn RpcHandler>,
    shutdown: Arc<Notify>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = tokio::select! {
            _ = shutdown.notified() => break,
            read = reader.read_line(&mut line) => read?,
        };
        if bytes_read == 0 {
            debug!("rpc client disconnected");
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(trimmed) {
            Ok(RpcMessage::Request(request)) => request,
            Ok(RpcMessage::Response(_)) => {
                debug!("ignoring stray response frame");
                continue;
            }
            Err(e) => {
                let response = RpcResponse::error(
                    None,
                    RpcErrorObject::new(error_codes::PARSE_ERROR, format!("parse error: {e}")),
                );
                write_response(&mut write_half, &response).await?;
                continue;
            }
        };

        let id = request.id;
        let outcome = handler.handle(&request.method, request.params).await;
        match id {
            Some(id) => {
                let response = match outcome {
                    Ok(result) => RpcResponse::result(Some(id), result),
                    Err(error) => RpcResponse::error(Some(id), error),
                };
                write_response(&mut write_half, &response).await?;
            }
            None => {
                if let Err(error) = outcome {
                    debug!(
                        method = %request.method,
                        code = error.code,
                        message = %error.message,
                        "notification handler failed"
                    );
                }
            }
        }
    }

    Ok(())
}

async fn write_response(
    writer: &mut (impl AsyncWriteExt + Unpin),
    response: &RpcResponse,
) -> std::io::Result<()> {
    let payload = serde_json::to_string(response)?;
    writer.write_all(payload.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
