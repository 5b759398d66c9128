//! Typed client for language runtime plugins.

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Duration;

use groundwork_foundation::HostResult;
use groundwork_plugin_api::protocol::methods;
use groundwork_plugin_api::{LanguageRuntime, PluginInfo, ProgInfo, RunInfo, RunResult};

use crate::launcher::LaunchedPlugin;
use crate::rpc::RpcClient;

/// Deadline for a full program execution.
const RUN_DEADLINE: Duration = Duration::from_secs(60 * 60 * 24);

/// A language runtime reached over its RPC channel.
pub struct LanguageClient {
    name: String,
    rpc: RpcClient,
    process: Option<LaunchedPlugin>,
}

impl LanguageClient {
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
impl LanguageRuntime for LanguageClient {
    async fn get_required_plugins(&self, info: &ProgInfo) -> HostResult<Vec<PluginInfo>> {
        let params = serde_json::to_value(info)?;
        let result = self
            .rpc
            .call(methods::LANGUAGE_GET_REQUIRED_PLUGINS, params)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn run(&self, info: &RunInfo) -> HostResult<RunResult> {
        let params = serde_json::to_value(info)?;
        // A program run can outlive any sane RPC deadline; give it a day.
        let result = self
            .rpc
            .call_with_deadline(methods::LANGUAGE_RUN, params, RUN_DEADLINE)
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
