//! Capability traits for the three plugin kinds, and the interfaces the
//! engine injects into the host.
//!
//! Each trait is object-safe and async: the host holds plugins as
//! `Arc<dyn Analyzer>` etc., and tests substitute in-process mocks for the
//! RPC-backed clients.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};

use groundwork_foundation::{HostResult, PropertyMap};

use crate::info::{PluginInfo, PluginKind};

/// Everything the host knows about the program it is about to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgInfo {
    /// Project name.
    pub project: String,
    /// Language runtime identifier, e.g. `"nodejs"`.
    pub runtime: String,
    /// Analyzers listed in the project file.
    #[serde(default)]
    pub analyzers: Vec<String>,
    /// Working directory for the program.
    pub pwd: PathBuf,
    /// Program entry point, relative to `pwd`.
    pub program: String,
}

/// Parameters for one program execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    /// Address of the Resource Monitor the program should register against.
    pub monitor_addr: String,
    pub project: String,
    pub pwd: PathBuf,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub config: HashMap<String, String>,
    /// True when the engine is previewing rather than deploying.
    #[serde(default)]
    pub dry_run: bool,
}

/// Outcome of a program execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResult {
    /// Error message, if the program failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when the program requested termination without error.
    #[serde(default)]
    pub bail: bool,
}

/// One finding from a policy analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeDiagnostic {
    /// Property the finding is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    pub message: String,
}

/// A structured input-validation failure from a provider.
///
/// Distinct from transport errors: the RPC itself succeeded, the inputs did
/// not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    pub reason: String,
}

/// Result of validating resource inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckResult {
    /// Inputs with defaults applied.
    #[serde(default)]
    pub inputs: PropertyMap,
    #[serde(default)]
    pub failures: Vec<CheckFailure>,
}

/// Result of diffing old against new resource state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffResult {
    /// Properties whose change forces a replacement.
    #[serde(default)]
    pub replace_keys: Vec<String>,
    /// Properties guaranteed not to change.
    #[serde(default)]
    pub stable_keys: Vec<String>,
}

/// Result of creating a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResult {
    pub id: String,
    #[serde(default)]
    pub outputs: PropertyMap,
    #[serde(default)]
    pub stable_keys: Vec<String>,
}

/// Result of updating a resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateResult {
    #[serde(default)]
    pub outputs: PropertyMap,
}

/// Result of a provider function invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeResult {
    #[serde(default)]
    pub result: PropertyMap,
    #[serde(default)]
    pub failures: Vec<CheckFailure>,
}

/// A policy analyzer plugin.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze a single resource's properties.
    async fn analyze(
        &self,
        resource_type: &str,
        properties: &PropertyMap,
    ) -> HostResult<Vec<AnalyzeDiagnostic>>;

    async fn get_plugin_info(&self) -> HostResult<PluginInfo>;

    async fn close(&self) -> HostResult<()>;
}

/// A language runtime plugin.
#[async_trait]
pub trait LanguageRuntime: Send + Sync {
    /// Enumerate the plugins the given program will need.
    async fn get_required_plugins(&self, info: &ProgInfo) -> HostResult<Vec<PluginInfo>>;

    /// Execute the program; resource operations flow to the monitor address
    /// in `info`.
    async fn run(&self, info: &RunInfo) -> HostResult<RunResult>;

    async fn get_plugin_info(&self) -> HostResult<PluginInfo>;

    async fn close(&self) -> HostResult<()>;
}

/// A resource provider plugin.
///
/// A provider must be configured exactly once before any method other than
/// `get_plugin_info` is called; the host's registry enforces this before a
/// handle ever becomes observable.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    async fn configure(&self, variables: &HashMap<String, String>) -> HostResult<()>;

    async fn check(&self, resource_type: &str, inputs: &PropertyMap) -> HostResult<CheckResult>;

    async fn diff(
        &self,
        resource_type: &str,
        id: &str,
        olds: &PropertyMap,
        news: &PropertyMap,
    ) -> HostResult<DiffResult>;

    async fn create(&self, resource_type: &str, inputs: &PropertyMap) -> HostResult<CreateResult>;

    /// Read live state; `properties` optionally scopes the read.
    async fn read(
        &self,
        resource_type: &str,
        id: &str,
        properties: Option<&PropertyMap>,
    ) -> HostResult<PropertyMap>;

    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        olds: &PropertyMap,
        news: &PropertyMap,
    ) -> HostResult<UpdateResult>;

    async fn delete(
        &self,
        resource_type: &str,
        id: &str,
        properties: &PropertyMap,
    ) -> HostResult<()>;

    /// Invoke a provider function, e.g. `"aws:index/getAmi"`.
    async fn invoke(&self, token: &str, args: &PropertyMap) -> HostResult<InvokeResult>;

    async fn get_plugin_info(&self) -> HostResult<PluginInfo>;

    async fn close(&self) -> HostResult<()>;
}

/// Resolves a plugin identity to the binary implementing it.
///
/// Installation layout and search order belong to the embedding engine; the
/// host only ever asks for a path.
pub trait PluginResolver: Send + Sync {
    fn resolve(
        &self,
        kind: PluginKind,
        name: &str,
        version: Option<&Version>,
    ) -> HostResult<PathBuf>;
}

/// Source of per-package provider configuration.
pub trait ConfigSource: Send + Sync {
    fn get_package_config(&self, pkg: &str) -> HostResult<HashMap<String, String>>;
}

/// Optional callbacks on plugin lifecycle events.
pub trait Events: Send + Sync {
    /// Fired after each plugin is loaded and inserted into the registry.
    fn on_plugin_load(&self, info: &PluginInfo) -> HostResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_result_defaults() {
        let result: RunResult = serde_json::from_str("{}").unwrap();
        assert!(result.error.is_none());
        assert!(!result.bail);
    }

    #[test]
    fn check_result_tolerates_missing_fields() {
        let result: CheckResult = serde_json::from_str(r#"{"failures": []}"#).unwrap();
        assert!(result.inputs.is_empty());
        assert!(result.failures.is_empty());
    }

    #[test]
    fn prog_info_round_trips() {
        let info = ProgInfo {
            project: "acme".into(),
            runtime: "nodejs".into(),
            analyzers: vec!["policy-a".into()],
            pwd: PathBuf::from("/work/acme"),
            program: "index.js".into(),
        };
        let encoded = serde_json::to_string(&info).unwrap();
        let decoded: ProgInfo = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.runtime, "nodejs");
        assert_eq!(decoded.analyzers, vec!["policy-a".to_string()]);
    }
}
