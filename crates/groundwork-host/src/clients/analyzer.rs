//! Typed client for policy analyzer plugins.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Duration;

use groundwork_foundation::{HostResult, PropertyMap};
use groundwork_plugin_api::protocol::methods;
use groundwork_plugin_api::{AnalyzeDiagnostic, Analyzer, PluginInfo};

use crate::launcher::LaunchedPlugin;
use crate::rpc::RpcClient;

/// A policy analyzer reached over its RPC channel.
pub struct AnalyzerClient {
    name: String,
    rpc: RpcClient,
    process: Option<LaunchedPlugin>,
}

impl AnalyzerClient {
    /// Connect to a launched plugin and take ownership of its process.
    pub async fn connect(process: LaunchedPlugin, rpc_deadline: Duration) -> HostResult<Self> {
        let rpc = RpcClient::connect(process.address(), process.name(), rpc_deadline).await?;
        Ok(Self {
            name: process.name().to_string(),
            rpc,
            process: Some(process),
        })
    }

    /// Attach to an existing endpoint without owning a process.
    pub fn attach(rpc: RpcClient, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rpc,
            process: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Analyzer for AnalyzerClient {
    async fn analyze(
        &self,
        resource_type: &str,
        properties: &PropertyMap,
    ) -> HostResult<Vec<AnalyzeDiagnostic>> {
        let result = self
            .rpc
            .call(
                methods::ANALYZER_ANALYZE,
                json!({ "type": resource_type, "properties": properties }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn get_plugin_info(&self) -> HostResult<PluginInfo> {
        let result = self.rpc.call(methods::PLUGIN_GET_INFO, Value::Null).await?;
        let mut info: PluginInfo = serde_json::from_value(result)?;
        if info.install_path.is_none() {
            info.install_path = self.process.as_ref().map(|p| p.path().to_path_buf());
        }
        Ok(info)
    }

    async fn close(&self) -> HostResult<()> {
        let _ = self.rpc.notify(methods::PLUGIN_CLOSE, Value::Null).await;
        self.rpc.shutdown().await;
        match &self.process {
            Some(process) => process.close().await,
            None => Ok(()),
        }
    }
}
