//! The Resource Monitor service.
//!
//! Language runtimes drive program execution against this endpoint: each
//! resource operation in the user program becomes one RPC here. The monitor
//! assigns URNs, records registrations, and delegates provider work through
//! the [`ProviderSource`] seam. Per-resource failures are reported on their
//! own RPC; the monitor keeps serving everything else.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use groundwork_foundation::{HostError, HostResult, PropertyMap, Urn};
use groundwork_plugin_api::protocol::{error_codes, methods, RpcErrorObject};
use groundwork_plugin_api::{
    Provider, ReadResourceParams, ReadResourceResult, RegisterResourceOutputsParams,
    RegisterResourceResult, ResourceRegistration,
};

use crate::host::Host;
use crate::rpc::{RpcHandler, RpcServer};

/// Where the monitor gets providers from.
///
/// Implemented by every [`Host`]; tests substitute fakes.
#[async_trait]
pub trait ProviderSource: Send + Sync {
    async fn provider(
        &self,
        pkg: &str,
        version: Option<&Version>,
    ) -> HostResult<Arc<dyn Provider>>;
}

#[async_trait]
impl<T: Host> ProviderSource for T {
    async fn provider(
        &self,
        pkg: &str,
        version: Option<&Version>,
    ) -> HostResult<Arc<dyn Provider>> {
        Host::provider(self, pkg, version).await
    }
}

/// The engine-side record of one registered resource.
///
/// Created by `registerResource`, completed by the provider's response, and
/// extended by any number of `registerResourceOutputs` calls until the
/// program terminates, after which the frozen set goes to the planner.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub urn: Urn,
    pub id: Option<String>,
    pub resource_type: String,
    pub name: String,
    pub parent: Option<Urn>,
    pub inputs: PropertyMap,
    pub outputs: PropertyMap,
    pub dependencies: Vec<Urn>,
    pub protect: bool,
    pub stable_keys: Vec<String>,
}

/// The Resource Monitor: an RPC service on its own listener.
pub struct ResourceMonitor {
    rpc: RpcServer,
    state: Arc<MonitorState>,
}

impl ResourceMonitor {
    /// Bind the monitor on an ephemeral loopback port.
    pub async fn bind(bind_host: &str, providers: Arc<dyn ProviderSource>) -> HostResult<Self> {
        let state = Arc::new(MonitorState {
            providers,
            records: Mutex::new(RecordStore::default()),
        });
        let rpc = RpcServer::bind(bind_host, Arc::new(MonitorHandler(state.clone()))).await?;
        Ok(Self { rpc, state })
    }

    /// The `host:port` endpoint handed to the language runtime.
    pub fn address(&self) -> String {
        self.rpc.address()
    }

    /// Stop serving and freeze the records for the planner, in registration
    /// order.
    pub async fn finish(self) -> Vec<ResourceRecord> {
        self.rpc.shutdown();
        let mut guard = self.state.records.lock().await;
        let RecordStore { mut records, order } = std::mem::take(&mut *guard);
        order
            .into_iter()
            .filter_map(|urn| records.remove(&urn))
            .collect()
    }
}

#[derive(Default)]
struct RecordStore {
    records: HashMap<Urn, ResourceRecord>,
    /// Registration order, for a deterministic hand-off.
    order: Vec<Urn>,
}

struct MonitorState {
    providers: Arc<dyn ProviderSource>,
    records: Mutex<RecordStore>,
}

impl MonitorState {
    /// `monitor/registerResource`: assign a URN, reserve it, delegate custom
    /// resources to their provider, and materialize the outputs.
    async fn register_resource(
        &self,
        registration: ResourceRegistration,
    ) -> HostResult<RegisterResourceResult> {
        let urn = Urn::derive(
            registration.parent.as_ref(),
            &registration.resource_type,
            &registration.name,
        );

        // Reserve the URN before any provider work so a concurrent duplicate
        // fails fast.
        {
            let mut store = self.records.lock().await;
            if store.records.contains_key(&urn) {
                return Err(HostError::DuplicateUrn(urn));
            }
            store.records.insert(
                urn.clone(),
                ResourceRecord {
                    urn: urn.clone(),
                    id: None,
                    resource_type: registration.resource_type.clone(),
                    name: registration.name.clone(),
                    parent: registration.parent.clone(),
                    inputs: registration.object.clone(),
                    outputs: PropertyMap::new(),
                    dependencies: registration.dependencies.clone(),
                    protect: registration.protect,
                    stable_keys: Vec::new(),
                },
            );
            store.order.push(urn.clone());
        }

        debug!(urn = %urn, resource_type = %registration.resource_type, "resource registered");

        let materialized = if registration.custom {
            // Provider-managed: create through the package's provider.
            let pkg = package_of(&registration.resource_type);
            let outcome = async {
                let provider = self.providers.provider(pkg, None).await?;
                provider
                    .create(&registration.resource_type, &registration.object)
                    .await
            }
            .await;

            match outcome {
                Ok(created) => created,
                Err(e) => {
                    // Release the reservation so a retry is possible.
                    let mut store = self.records.lock().await;
                    store.records.remove(&urn);
                    store.order.retain(|u| u != &urn);
                    return Err(e);
                }
            }
        } else {
            // Components materialize their inputs directly.
            groundwork_plugin_api::CreateResult {
                id: String::new(),
                outputs: registration.object.clone(),
                stable_keys: Vec::new(),
            }
        };

        let id = (!materialized.id.is_empty()).then(|| materialized.id.clone());

        // Complete the record: this is the one provider-driven mutation.
        {
            let mut store = self.records.lock().await;
            if let Some(record) = store.records.get_mut(&urn) {
                record.id = id.clone();
                record.outputs = materialized.outputs.clone();
                record.stable_keys = materialized.stable_keys.clone();
            }
        }

        Ok(RegisterResourceResult {
            urn,
            id,
            object: materialized.outputs,
            stable: true,
            stable_keys: materialized.stable_keys,
        })
    }

    /// `monitor/registerResourceOutputs`: attach extra outputs to an
    /// existing record.
    async fn register_resource_outputs(
        &self,
        params: RegisterResourceOutputsParams,
    ) -> HostResult<()> {
        let mut store = self.records.lock().await;
        let record = store
            .records
            .get_mut(&params.urn)
            .ok_or_else(|| HostError::UnknownUrn(params.urn.clone()))?;
        record.outputs.extend(params.outputs);
        Ok(())
    }

    /// `monitor/readResource`: read live state through the provider and
    /// assign a URN.
    async fn read_resource(&self, params: ReadResourceParams) -> HostResult<ReadResourceResult> {
        let urn = Urn::derive(params.parent.as_ref(), &params.resource_type, &params.name);
        let pkg = package_of(&params.resource_type);
        let provider = self.providers.provider(pkg, None).await?;
        let properties = provider
            .read(&params.resource_type, &params.id, params.properties.as_ref())
            .await?;
        Ok(ReadResourceResult { urn, properties })
    }

    /// `monitor/invoke`: dispatch a function call to the token's provider.
    async fn invoke(
        &self,
        token: &str,
        args: &PropertyMap,
    ) -> HostResult<groundwork_plugin_api::InvokeResult> {
        let provider = self.providers.provider(package_of(token), None).await?;
        provider.invoke(token, args).await
    }
}

struct MonitorHandler(Arc<MonitorState>);

#[async_trait]
impl RpcHandler for MonitorHandler {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcErrorObject> {
        match method {
            methods::MONITOR_REGISTER_RESOURCE => {
                let registration: ResourceRegistration = decode(params)?;
                let result = self
                    .0
                    .register_resource(registration)
                    .await
                    .map_err(to_rpc_error)?;
                encode(&result)
            }
            methods::MONITOR_REGISTER_RESOURCE_OUTPUTS => {
                let outputs: RegisterResourceOutputsParams = decode(params)?;
                self.0
                    .register_resource_outputs(outputs)
                    .await
                    .map_err(to_rpc_error)?;
                Ok(Value::Null)
            }
            methods::MONITOR_READ_RESOURCE => {
                let read: ReadResourceParams = decode(params)?;
                let result = self.0.read_resource(read).await.map_err(to_rpc_error)?;
                encode(&result)
            }
            methods::MONITOR_INVOKE => {
                #[derive(serde::Deserialize)]
                struct InvokeParams {
                    token: String,
                    #[serde(default)]
                    args: PropertyMap,
                }
                let invoke: InvokeParams = decode(params)?;
                let result = self
                    .0
                    .invoke(&invoke.token, &invoke.args)
                    .await
                    .map_err(to_rpc_error)?;
                encode(&result)
            }
            _ => Err(RpcErrorObject::method_not_found(method)),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, RpcErrorObject> {
    serde_json::from_value(params).map_err(|e| RpcErrorObject::invalid_params(e.to_string()))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, RpcErrorObject> {
    serde_json::to_value(value)
        .map_err(|e| RpcErrorObject::new(error_codes::INTERNAL_ERROR, e.to_string()))
}

fn to_rpc_error(error: HostError) -> RpcErrorObject {
    let code = match &error {
        HostError::DuplicateUrn(_) => error_codes::DUPLICATE_URN,
        HostError::UnknownUrn(_) => error_codes::UNKNOWN_URN,
        HostError::HostClosed => error_codes::HOST_CLOSED,
        HostError::Rpc { code, .. } => *code,
        _ => error_codes::PROVIDER_FAILURE,
    };
    RpcErrorObject::new(code, error.to_string())
}

/// The package a type or function token belongs to: its leading segment,
/// e.g. `aws` for `aws:ec2/vpc`.
fn package_of(token: &str) -> &str {
    token.split(':').next().unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundwork_foundation::PropertyValue;
    use groundwork_plugin_api::{
        AnalyzeDiagnostic, CheckFailure, CheckResult, CreateResult, DiffResult, InvokeResult,
        PluginInfo, PluginKind, UpdateResult,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct ScriptedProvider {
        creates: AtomicUsize,
        fail_create: bool,
    }

    impl ScriptedProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                creates: AtomicUsize::new(0),
                fail_create: false,
            })
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn configure(&self, _v: &HashMap<String, String>) -> HostResult<()> {
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
            if self.fail_create {
                return Err(HostError::internal("create refused"));
            }
            let n = self.creates.fetch_add(1, Ordering::SeqCst);
            let mut outputs = inputs.clone();
            outputs.insert("arn".into(), PropertyValue::from("arn:mock:123"));
            Ok(CreateResult {
                id: format!("{resource_type}-{n}"),
                outputs,
                stable_keys: vec!["arn".into()],
            })
        }

        async fn read(
            &self,
            _t: &str,
            id: &str,
            _properties: Option<&PropertyMap>,
        ) -> HostResult<PropertyMap> {
            let mut properties = PropertyMap::new();
            properties.insert("id".into(), PropertyValue::from(id));
            Ok(properties)
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

        async fn delete(&self, _t: &str, _id: &str, _p: &PropertyMap) -> HostResult<()> {
            Ok(())
        }

        async fn invoke(&self, token: &str, _args: &PropertyMap) -> HostResult<InvokeResult> {
            if token.ends_with("badInput") {
                return Ok(InvokeResult {
                    result: PropertyMap::new(),
                    failures: vec![CheckFailure {
                        property: Some("zone".into()),
                        reason: "unknown zone".into(),
                    }],
                });
            }
            let mut result = PropertyMap::new();
            result.insert("token".into(), PropertyValue::from(token));
            Ok(InvokeResult {
                result,
                failures: vec![],
            })
        }

        async fn get_plugin_info(&self) -> HostResult<PluginInfo> {
            Ok(PluginInfo::new(PluginKind::Resource, "mock"))
        }

        async fn close(&self) -> HostResult<()> {
            Ok(())
        }
    }

    struct SingleProviderSource {
        provider: Arc<ScriptedProvider>,
        asked_for: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProviderSource for SingleProviderSource {
        async fn provider(
            &self,
            pkg: &str,
            _version: Option<&Version>,
        ) -> HostResult<Arc<dyn Provider>> {
            self.asked_for.lock().await.push(pkg.to_string());
            Ok(self.provider.clone())
        }
    }

    async fn monitor_with(provider: Arc<ScriptedProvider>) -> (ResourceMonitor, Arc<SingleProviderSource>) {
        let source = Arc::new(SingleProviderSource {
            provider,
            asked_for: Mutex::new(vec![]),
        });
        let monitor = ResourceMonitor::bind("127.0.0.1", source.clone())
            .await
            .unwrap();
        (monitor, source)
    }

    fn registration(name: &str, custom: bool) -> ResourceRegistration {
        let mut object = PropertyMap::new();
        object.insert("cidr".into(), PropertyValue::from("10.0.0.0/16"));
        ResourceRegistration {
            resource_type: "aws:ec2/vpc".into(),
            name: name.into(),
            parent: None,
            custom,
            object,
            protect: false,
            dependencies: vec![],
        }
    }

    #[tokio::test]
    async fn custom_resource_registration_creates_through_the_provider() {
        let provider = ScriptedProvider::new();
        let (monitor, source) = monitor_with(provider.clone()).await;

        let result = monitor
            .state
            .register_resource(registration("main", true))
            .await
            .unwrap();

        assert_eq!(result.id.as_deref(), Some("aws:ec2/vpc-0"));
        assert_eq!(
            result.object.get("arn").and_then(PropertyValue::as_str),
            Some("arn:mock:123")
        );
        assert_eq!(result.stable_keys, vec!["arn".to_string()]);
        assert_eq!(source.asked_for.lock().await.as_slice(), ["aws"]);

        let records = monitor.finish().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_deref(), Some("aws:ec2/vpc-0"));
    }

    #[tokio::test]
    async fn component_registration_skips_the_provider() {
        let provider = ScriptedProvider::new();
        let (monitor, source) = monitor_with(provider.clone()).await;

        let result = monitor
            .state
            .register_resource(registration("group", false))
            .await
            .unwrap();

        assert!(result.id.is_none());
        assert_eq!(provider.creates.load(Ordering::SeqCst), 0);
        assert!(source.asked_for.lock().await.is_empty());
        assert_eq!(
            result.object.get("cidr").and_then(PropertyValue::as_str),
            Some("10.0.0.0/16")
        );
        drop(monitor);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected_and_service_continues() {
        let provider = ScriptedProvider::new();
        let (monitor, _source) = monitor_with(provider).await;

        monitor
            .state
            .register_resource(registration("main", true))
            .await
            .unwrap();
        let err = monitor
            .state
            .register_resource(registration("main", true))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::DuplicateUrn(_)));

        // Another name still registers fine.
        monitor
            .state
            .register_resource(registration("other", true))
            .await
            .unwrap();

        let records = monitor.finish().await;
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn failed_create_releases_the_urn() {
        let provider = Arc::new(ScriptedProvider {
            creates: AtomicUsize::new(0),
            fail_create: true,
        });
        let (monitor, _source) = monitor_with(provider).await;

        assert!(monitor
            .state
            .register_resource(registration("main", true))
            .await
            .is_err());

        let records = monitor.finish().await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn outputs_extend_an_existing_record() {
        let provider = ScriptedProvider::new();
        let (monitor, _source) = monitor_with(provider).await;

        let result = monitor
            .state
            .register_resource(registration("main", true))
            .await
            .unwrap();

        let mut outputs = PropertyMap::new();
        outputs.insert("extra".into(), PropertyValue::from(true));
        monitor
            .state
            .register_resource_outputs(RegisterResourceOutputsParams {
                urn: result.urn.clone(),
                outputs,
            })
            .await
            .unwrap();

        let records = monitor.finish().await;
        assert_eq!(records[0].outputs.get("extra"), Some(&PropertyValue::Bool(true)));
        assert!(records[0].outputs.contains_key("arn"));
    }

    #[tokio::test]
    async fn outputs_for_unknown_urn_fail() {
        let provider = ScriptedProvider::new();
        let (monitor, _source) = monitor_with(provider).await;

        let err = monitor
            .state
            .register_resource_outputs(RegisterResourceOutputsParams {
                urn: Urn::derive(None, "aws:ec2/vpc", "ghost"),
                outputs: PropertyMap::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::UnknownUrn(_)));
        drop(monitor);
    }

    #[tokio::test]
    async fn read_resource_goes_through_the_provider() {
        let provider = ScriptedProvider::new();
        let (monitor, _source) = monitor_with(provider).await;

        let result = monitor
            .state
            .read_resource(ReadResourceParams {
                id: "vpc-123".into(),
                resource_type: "aws:ec2/vpc".into(),
                name: "imported".into(),
                parent: None,
                properties: None,
            })
            .await
            .unwrap();

        assert_eq!(
            result.properties.get("id").and_then(PropertyValue::as_str),
            Some("vpc-123")
        );
        drop(monitor);
    }

    #[tokio::test]
    async fn invoke_reports_input_failures_in_band() {
        let provider = ScriptedProvider::new();
        let (monitor, _source) = monitor_with(provider).await;

        let ok = monitor
            .state
            .invoke("aws:index/getAmi", &PropertyMap::new())
            .await
            .unwrap();
        assert!(ok.failures.is_empty());

        let failed = monitor
            .state
            .invoke("aws:index/badInput", &PropertyMap::new())
            .await
            .unwrap();
        assert_eq!(failed.failures.len(), 1);
        assert_eq!(failed.failures[0].property.as_deref(), Some("zone"));
        drop(monitor);
    }

    #[test]
    fn package_of_takes_the_leading_segment() {
        assert_eq!(package_of("aws:ec2/vpc"), "aws");
        assert_eq!(package_of("kubernetes"), "kubernetes");
    }

    #[tokio::test]
    async fn urn_collision_respects_parentage() {
        let provider = ScriptedProvider::new();
        let (monitor, _source) = monitor_with(provider).await;

        let parent = monitor
            .state
            .register_resource(registration("main", false))
            .await
            .unwrap();

        // Same (type, name) under a parent is a different URN.
        let mut child = registration("main", false);
        child.parent = Some(parent.urn.clone());
        monitor.state.register_resource(child).await.unwrap();

        let records = monitor.finish().await;
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].urn, records[1].urn);
    }
}
