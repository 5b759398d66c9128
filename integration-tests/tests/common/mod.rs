//! Shared fakes for the end-to-end tests.
//!
//! Each test binary compiles this module separately and uses a subset of it.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use semver::Version;
use serde_json::{json, Value};

use groundwork_foundation::{
    DiagSink, HostError, HostResult, LogEntry, PropertyMap, PropertyValue,
};
use groundwork_host::monitor::ProviderSource;
use groundwork_host::rpc::RpcHandler;
use groundwork_plugin_api::protocol::{methods, RpcErrorObject};
use groundwork_plugin_api::{
    CheckResult, CreateResult, DiffResult, InvokeResult, PluginInfo, PluginKind, Provider,
    UpdateResult,
};

/// Diagnostics sink that remembers everything.
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl DiagSink for RecordingSink {
    fn log(&self, entry: LogEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

/// The plugin side of the wire, served in-process: responds to the common
/// plugin methods plus the provider surface the tests exercise.
pub struct FakeProviderPlugin {
    pub name: String,
    pub version: Version,
    pub configures: AtomicUsize,
}

impl FakeProviderPlugin {
    pub fn new(name: &str, version: Version) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            version,
            configures: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RpcHandler for FakeProviderPlugin {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcErrorObject> {
        match method {
            methods::PLUGIN_GET_INFO => Ok(json!({
                "kind": "resource",
                "name": self.name,
                "version": self.version.to_string(),
            })),
            methods::PLUGIN_CLOSE => Ok(Value::Null),
            methods::PROVIDER_CONFIGURE => {
                self.configures.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
            methods::PROVIDER_CREATE => {
                let inputs = params.get("inputs").cloned().unwrap_or(json!({}));
                let resource_type = params
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Ok(json!({
                    "id": format!("{resource_type}::created"),
                    "outputs": inputs,
                    "stable_keys": ["id"],
                }))
            }
            methods::PROVIDER_INVOKE => Ok(json!({
                "result": { "echo": params.get("token") },
                "failures": [],
            })),
            methods::PROVIDER_CHECK => Ok(json!({
                "inputs": params.get("inputs").cloned().unwrap_or(json!({})),
                "failures": [],
            })),
            _ => Err(RpcErrorObject::method_not_found(method)),
        }
    }
}

/// An in-process provider handed out by [`StaticProviderSource`].
#[derive(Debug)]
pub struct InProcessProvider {
    pub creates: AtomicUsize,
}

impl InProcessProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            creates: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Provider for InProcessProvider {
    async fn configure(&self, _variables: &HashMap<String, String>) -> HostResult<()> {
        Ok(())
    }

    async fn check(&self, _t: &str, _inputs: &PropertyMap) -> HostResult<CheckResult> {
        Ok(CheckResult::default())
    }

    async fn diff(
        &self,
        _t: &str,
        _id: &str,
        _olds: &PropertyMap,
        _news: &PropertyMap,
    ) -> HostResult<DiffResult> {
        Ok(DiffResult::default())
    }

    async fn create(&self, resource_type: &str, inputs: &PropertyMap) -> HostResult<CreateResult> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst);
        let mut outputs = inputs.clone();
        outputs.insert("serial".into(), PropertyValue::Number(n as f64));
        Ok(CreateResult {
            id: format!("{resource_type}#{n}"),
            outputs,
            stable_keys: vec!["serial".into()],
        })
    }

    async fn read(
        &self,
        _t: &str,
        _id: &str,
        _properties: Option<&PropertyMap>,
    ) -> HostResult<PropertyMap> {
        Ok(PropertyMap::new())
    }

    async fn update(
        &self,
        _t: &str,
        _id: &str,
        _olds: &PropertyMap,
        _news: &PropertyMap,
    ) -> HostResult<UpdateResult> {
        Ok(UpdateResult::default())
    }

    async fn delete(&self, _t: &str, _id: &str, _properties: &PropertyMap) -> HostResult<()> {
        Ok(())
    }

    async fn invoke(&self, _token: &str, _args: &PropertyMap) -> HostResult<InvokeResult> {
        Ok(InvokeResult::default())
    }

    async fn get_plugin_info(&self) -> HostResult<PluginInfo> {
        Ok(PluginInfo::new(PluginKind::Resource, "in-process"))
    }

    async fn close(&self) -> HostResult<()> {
        Ok(())
    }
}

/// Provider source that always hands out the same provider.
pub struct StaticProviderSource {
    pub provider: Arc<InProcessProvider>,
}

#[async_trait]
impl ProviderSource for StaticProviderSource {
    async fn provider(
        &self,
        _pkg: &str,
        _version: Option<&Version>,
    ) -> HostResult<Arc<dyn Provider>> {
        Ok(self.provider.clone())
    }
}

/// A source with no providers at all.
pub struct EmptyProviderSource;

#[async_trait]
impl ProviderSource for EmptyProviderSource {
    async fn provider(
        &self,
        pkg: &str,
        _version: Option<&Version>,
    ) -> HostResult<Arc<dyn Provider>> {
        Err(HostError::PluginNotFound {
            kind: "resource".into(),
            name: pkg.into(),
        })
    }
}
