//! Phone-home round trips through a live host.

mod common;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use semver::Version;
use serde_json::json;
use tokio::time::{sleep, Duration, Instant};

use common::RecordingSink;
use groundwork_foundation::{HostResult, Severity};
use groundwork_host::rpc::RpcClient;
use groundwork_host::{Host, HostBuilder, PluginLoader};
use groundwork_plugin_api::protocol::methods;
use groundwork_plugin_api::{Analyzer, LanguageRuntime, Provider};

/// A loader for hosts that never actually load plugins.
struct NoPlugins;

#[async_trait]
impl PluginLoader for NoPlugins {
    async fn load_analyzer(&self, name: &str) -> HostResult<Arc<dyn Analyzer>> {
        Err(groundwork_foundation::HostError::PluginNotFound {
            kind: "analyzer".into(),
            name: name.into(),
        })
    }

    async fn load_language(&self, runtime: &str) -> HostResult<Arc<dyn LanguageRuntime>> {
        Err(groundwork_foundation::HostError::PluginNotFound {
            kind: "language".into(),
            name: runtime.into(),
        })
    }

    async fn load_provider(
        &self,
        pkg: &str,
        _version: Option<&Version>,
    ) -> HostResult<Arc<dyn Provider>> {
        Err(groundwork_foundation::HostError::PluginNotFound {
            kind: "resource".into(),
            name: pkg.into(),
        })
    }
}

#[tokio::test]
async fn plugins_log_through_the_host_server() -> Result<()> {
    let sink = Arc::new(RecordingSink::default());
    let host = HostBuilder::new()
        .with_loader(Arc::new(NoPlugins))
        .with_diag_sink(sink.clone())
        .build()
        .await?;

    // A plugin would be handed this address on its command line.
    let addr = host.server_addr();
    let client = RpcClient::connect(&addr, "fake-plugin", Duration::from_secs(5)).await?;
    client
        .notify(
            methods::ENGINE_LOG,
            json!({"severity": "info", "message": "plugin booted"}),
        )
        .await?;

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let entries = sink.entries();
        if entries
            .iter()
            .any(|e| e.severity == Severity::Info && e.message == "plugin booted")
        {
            break;
        }
        assert!(Instant::now() < deadline, "log entry never arrived");
        sleep(Duration::from_millis(20)).await;
    }

    host.close().await?;

    // After close the server no longer accepts connections.
    sleep(Duration::from_millis(50)).await;
    assert!(
        RpcClient::connect(&addr, "late", Duration::from_secs(1))
            .await
            .is_err()
    );

    Ok(())
}

#[tokio::test]
async fn host_log_goes_to_the_sink() -> Result<()> {
    let sink = Arc::new(RecordingSink::default());
    let host = HostBuilder::new()
        .with_loader(Arc::new(NoPlugins))
        .with_diag_sink(sink.clone())
        .build()
        .await?;

    host.log(Severity::Error, None, "deployment failed".into());

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, Severity::Error);

    host.close().await?;
    Ok(())
}
