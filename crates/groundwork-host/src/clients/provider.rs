//! Typed client for resource provider plugins.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Duration;

use groundwork_foundation::{HostResult, PropertyMap};
use groundwork_plugin_api::protocol::methods;
use groundwork_plugin_api::{
    CheckResult, CreateResult, DiffResult, InvokeResult, PluginInfo, Provider, UpdateResult,
};

use crate::launcher::LaunchedPlugin;
use crate::rpc::RpcClient;

/// A resource provider reached over its RPC channel.
#[derive(Debug)]
pub struct ProviderClient {
    name: String,
    rpc: RpcClient,
    process: Option<LaunchedPlugin>,
}

impl ProviderClient {
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
impl Provider for ProviderClient {
    async fn configure(&self, variables: &HashMap<String, String>) -> HostResult<()> {
        self.rpc
            .call(methods::PROVIDER_CONFIGURE, json!({ "variables": variables }))
            .await?;
        Ok(())
    }

    async fn check(&self, resource_type: &str, inputs: &PropertyMap) -> HostResult<CheckResult> {
        let result = self
            .rpc
            .call(
                methods::PROVIDER_CHECK,
                json!({ "type": resource_type, "inputs": inputs }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn diff(
        &self,
        resource_type: &str,
        id: &str,
        olds: &PropertyMap,
        news: &PropertyMap,
    ) -> HostResult<DiffResult> {
        let result = self
            .rpc
            .call(
                methods::PROVIDER_DIFF,
                json!({ "type": resource_type, "id": id, "olds": olds, "news": news }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn create(&self, resource_type: &str, inputs: &PropertyMap) -> HostResult<CreateResult> {
        let result = self
            .rpc
            .call(
                methods::PROVIDER_CREATE,
                json!({ "type": resource_type, "inputs": inputs }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn read(
        &self,
        resource_type: &str,
        id: &str,
        properties: Option<&PropertyMap>,
    ) -> HostResult<PropertyMap> {
        let result = self
            .rpc
            .call(
                methods::PROVIDER_READ,
                json!({ "type": resource_type, "id": id, "properties": properties }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        olds: &PropertyMap,
        news: &PropertyMap,
    ) -> HostResult<UpdateResult> {
        let result = self
            .rpc
            .call(
                methods::PROVIDER_UPDATE,
                json!({ "type": resource_type, "id": id, "olds": olds, "news": news }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn delete(
        &self,
        resource_type: &str,
        id: &str,
        properties: &PropertyMap,
    ) -> HostResult<()> {
        self.rpc
            .call(
                methods::PROVIDER_DELETE,
                json!({ "type": resource_type, "id": id, "properties": properties }),
            )
            .await?;
        Ok(())
    }

    async fn invoke(&self, token: &str, args: &PropertyMap) -> HostResult<InvokeResult> {
        let result = self
            .rpc
            .call(
                methods::PROVIDER_INVOKE,
                json!({ "token": token, "args": args }),
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
