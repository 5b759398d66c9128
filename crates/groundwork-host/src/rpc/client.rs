//! RPC client for communicating with a single plugin process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use groundwork_foundation::{HostError, HostResult};
use groundwork_plugin_api::protocol::{
    error_codes, RpcErrorObject, RpcMessage, RpcRequest, RpcResponse,
};

/// Buffer size for the outbound message channel.
const CHANNEL_BUFFER_SIZE: usize = 256;

type PendingRequests = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, RpcErrorObject>>>>>;

/// Messages handed to the writer task.
#[derive(Debug)]
enum Outbound {
    Message(RpcMessage),
    Shutdown,
}

/// A JSON-RPC client over a single TCP connection.
///
/// One writer task serializes frames onto the socket; one reader task
/// resolves responses against a pending-request map. Each call gets a
/// deadline; expiry surfaces as [`HostError::DeadlineExceeded`].
#[derive(Debug)]
pub struct RpcClient {
    /// Peer name, used to tag diagnostics.
    peer: String,
    outbound_tx: mpsc::Sender<Outbound>,
    pending: PendingRequests,
    next_id: AtomicU64,
    default_deadline: Duration,
}

impl RpcClient {
    /// Connect to a plugin's RPC endpoint.
    pub async fn connect(
        addr: &str,
        peer: impl Into<String>,
        default_deadline: Duration,
    ) -> HostResult<Self> {
        let peer = peer.into();
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            HostError::start_failed(&peer, format!("failed to connect to {addr}: {e}"))
        })?;
        let (read_half, mut write_half) = stream.into_split();

        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(CHANNEL_BUFFER_SIZE);

        // Writer task: one frame per line.
        let writer_peer = peer.clone();
        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                let message = match outbound {
                    Outbound::Message(message) => message,
                    Outbound::Shutdown => break,
                };
                let line = match serde_json::to_string(&message) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(peer = %writer_peer, error = %e, "failed to serialize rpc frame");
                        continue;
                    }
                };
                if write_half.write_all(line.as_bytes()).await.is_err()
                    || write_half.write_all(b"\n").await.is_err()
                    || write_half.flush().await.is_err()
                {
                    debug!(peer = %writer_peer, "rpc connection closed while writing");
                    break;
                }
            }
            // Dropping the write half closes our side of the socket.
        });

        // Reader task: resolve responses, answer stray requests.
        let reader_pending = pending.clone();
        let reader_peer = peer.clone();
        let reader_tx = outbound_tx.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!(peer = %reader_peer, "rpc connection closed");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<RpcMessage>(trimmed) {
                            Ok(RpcMessage::Response(response)) => {
                                dispatch_response(&reader_pending, &reader_peer, response).await;
                            }
                            Ok(RpcMessage::Request(request)) => {
                                // Plugins phone home on the host server, not
                                // on this channel.
                                warn!(
                                    peer = %reader_peer,
                                    method = %request.method,
                                    "unexpected inbound request on client channel"
                                );
                                if let Some(id) = request.id {
                                    let reply = RpcMessage::Response(RpcResponse::error(
                                        Some(id),
                                        RpcErrorObject::method_not_found(&request.method),
                                    ));
                                    let _ = reader_tx.send(Outbound::Message(reply)).await;
                                }
                            }
                            Err(e) => {
                                warn!(peer = %reader_peer, error = %e, "undecodable rpc frame");
                            }
                        }
                    }
                    Err(e) => {
                        warn!(peer = %reader_peer, error = %e, "rpc read error");
                        break;
                    }
                }
            }
            // Fail anything still waiting.
            let mut pending = reader_pending.lock().await;
            for (_, tx) in pending.drain() {
                let _ = tx.send(Err(RpcErrorObject::new(
                    error_codes::INTERNAL_ERROR,
                    "connection closed",
                )));
            }
        });

        Ok(Self {
            peer,
            outbound_tx,
            pending,
            next_id: AtomicU64::new(1),
            default_deadline,
        })
    }

    /// The peer name this client talks to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Issue a request with the default deadline.
    pub async fn call(&self, method: &str, params: Value) -> HostResult<Value> {
        self.call_with_deadline(method, params, self.default_deadline)
            .await
    }

    /// Issue a request with an explicit deadline.
    pub async fn call_with_deadline(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> HostResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = RpcMessage::Request(RpcRequest::new(id, method, params));
        if self
            .outbound_tx
            .send(Outbound::Message(request))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(HostError::rpc(
                method,
                error_codes::INTERNAL_ERROR,
                "connection closed",
            ));
        }

        match timeout(deadline, rx).await {
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(HostError::DeadlineExceeded {
                    method: method.to_string(),
                })
            }
            Ok(Err(_)) => Err(HostError::rpc(
                method,
                error_codes::INTERNAL_ERROR,
                "connection closed",
            )),
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(error))) => Err(HostError::rpc(method, error.code, error.message)),
        }
    }

    /// Send a notification; no response is expected.
    pub async fn notify(&self, method: &str, params: Value) -> HostResult<()> {
        let notification = RpcMessage::Request(RpcRequest::notification(method, params));
        self.outbound_tx
            .send(Outbound::Message(notification))
            .await
            .map_err(|_| {
                HostError::rpc(method, error_codes::INTERNAL_ERROR, "connection closed")
            })
    }

    /// Close the connection. Idempotent; pending calls fail.
    pub async fn shutdown(&self) {
        let _ = self.outbound_tx.send(Outbound::Shutdown).await;
    }
}

async fn dispatch_response(pending: &PendingRequests, peer: &str, response: RpcResponse) {
    let Some(id) = response.id else {
        warn!(peer = %peer, "rpc response without id");
        return;
    };
    let Some(tx) = pending.lock().await.remove(&id) else {
        debug!(peer = %peer, id, "rpc response for unknown or timed-out request");
        return;
    };
    let outcome = match (response.result, response.error) {
        (_, Some(error)) => Err(error),
        (Some(value), None) => Ok(value),
        (None, None) => Ok(Value::Null),
    };
    let _ = tx.send(outcome);
}
