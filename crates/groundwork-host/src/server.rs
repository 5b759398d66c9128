//! The phone-home RPC server.
//!
//! Started eagerly at host construction; its address is handed to every
//! plugin at spawn time so they can call back into the engine. The only
//! service currently exposed is `engine/log`. The server outlives any
//! individual plugin and is shut down only when the host closes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use groundwork_foundation::{DiagSink, HostResult, LogEntry};
use groundwork_plugin_api::protocol::{methods, RpcErrorObject};

use crate::rpc::{RpcHandler, RpcServer};

/// The host's inbound RPC surface.
pub struct HostServer {
    rpc: RpcServer,
}

impl HostServer {
    /// Bind the phone-home server on an ephemeral loopback port.
    pub async fn bind(bind_host: &str, diag: Arc<dyn DiagSink>) -> HostResult<Self> {
        let rpc = RpcServer::bind(bind_host, Arc::new(EngineHandler { diag })).await?;
        Ok(Self { rpc })
    }

    /// The published `host:port` endpoint plugins are given.
    pub fn address(&self) -> String {
        self.rpc.address()
    }

    /// Stop the server. Idempotent.
    pub fn shutdown(&self) {
        self.rpc.shutdown();
    }
}

struct EngineHandler {
    diag: Arc<dyn DiagSink>,
}

#[async_trait]
impl RpcHandler for EngineHandler {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcErrorObject> {
        match method {
            methods::ENGINE_LOG => {
                let entry: LogEntry = serde_json::from_value(params)
                    .map_err(|e| RpcErrorObject::invalid_params(e.to_string()))?;
                self.diag.log(entry);
                Ok(Value::Null)
            }
            _ => Err(RpcErrorObject::method_not_found(method)),
        }
    }
}
