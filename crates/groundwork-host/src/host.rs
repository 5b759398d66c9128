//! The plugin host and its serialized registry.
//!
//! All mutation of the registry's three kind maps happens on a single worker
//! task fed by an unbounded command channel. Requests are processed strictly
//! in the order they were enqueued, which makes loads race-free without any
//! locking: concurrent callers asking for the same plugin are serialized, the
//! first one spawns, the rest hit the cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use groundwork_config::{AppConfig, PluginConfig};
use groundwork_foundation::{
    DiagSink, HostError, HostResult, LoadFailures, LogEntry, Severity, TracingSink, Urn,
};
use groundwork_plugin_api::{
    Analyzer, ConfigSource, Events, Flags, LanguageRuntime, PluginInfo, PluginKind,
    PluginResolver, ProgInfo, Provider,
};

use crate::clients::{AnalyzerClient, LanguageClient, ProviderClient};
use crate::launcher::{launch, LaunchOptions};
use crate::server::HostServer;

/// Environment toggle that suppresses stale-version warnings during plugin
/// development.
const DEV_MODE_ENV: &str = "GROUNDWORK_DEV";

/// A host of plugin processes, accessible by kind and identity.
#[async_trait]
pub trait Host: Send + Sync {
    /// Address of the phone-home RPC endpoint given to plugins.
    fn server_addr(&self) -> String;

    /// Log a message through the host's diagnostics sink.
    fn log(&self, severity: Severity, urn: Option<Urn>, message: String);

    /// Fetch the analyzer with the given name, lazily allocating it.
    async fn analyzer(&self, name: &str) -> HostResult<Arc<dyn Analyzer>>;

    /// Fetch the provider for a package, lazily allocating it. When a
    /// version is requested, an already-loaded provider must satisfy it.
    async fn provider(
        &self,
        pkg: &str,
        version: Option<&Version>,
    ) -> HostResult<Arc<dyn Provider>>;

    /// Fetch the language runtime for a runtime id, lazily allocating it.
    async fn language_runtime(&self, runtime: &str) -> HostResult<Arc<dyn LanguageRuntime>>;

    /// Every plugin loaded by this host, in load order.
    async fn list_plugins(&self) -> Vec<PluginInfo>;

    /// Load every plugin in the list whose kind's flag bit is set,
    /// aggregating all failures into one error.
    async fn ensure_plugins(&self, plugins: &[PluginInfo], kinds: Flags) -> HostResult<()>;

    /// Compute the full set of plugins the given program requires.
    async fn get_required_plugins(
        &self,
        info: &ProgInfo,
        kinds: Flags,
    ) -> HostResult<Vec<PluginInfo>>;

    /// Close every plugin and tear down the RPC servers. Idempotent.
    async fn close(&self) -> HostResult<()>;
}

/// Allocates plugins of each kind.
///
/// The default implementation resolves a binary and spawns it; tests inject
/// in-process fakes.
#[async_trait]
pub trait PluginLoader: Send + Sync {
    async fn load_analyzer(&self, name: &str) -> HostResult<Arc<dyn Analyzer>>;

    async fn load_language(&self, runtime: &str) -> HostResult<Arc<dyn LanguageRuntime>>;

    async fn load_provider(
        &self,
        pkg: &str,
        version: Option<&Version>,
    ) -> HostResult<Arc<dyn Provider>>;
}

/// Builder for [`DefaultHost`].
pub struct HostBuilder {
    config: AppConfig,
    resolver: Option<Arc<dyn PluginResolver>>,
    config_source: Option<Arc<dyn ConfigSource>>,
    events: Option<Arc<dyn Events>>,
    diag: Arc<dyn DiagSink>,
    loader: Option<Arc<dyn PluginLoader>>,
}

impl HostBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            resolver: None,
            config_source: None,
            events: None,
            diag: Arc::new(TracingSink),
            loader: None,
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn PluginResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_config_source(mut self, config_source: Arc<dyn ConfigSource>) -> Self {
        self.config_source = Some(config_source);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn Events>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_diag_sink(mut self, diag: Arc<dyn DiagSink>) -> Self {
        self.diag = diag;
        self
    }

    /// Substitute the plugin allocation path wholesale.
    pub fn with_loader(mut self, loader: Arc<dyn PluginLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Start the phone-home server and the registry worker.
    pub async fn build(self) -> HostResult<Arc<DefaultHost>> {
        let server = HostServer::bind(&self.config.plugins.bind_host, self.diag.clone()).await?;

        let loader = match self.loader {
            Some(loader) => loader,
            None => {
                let resolver = self.resolver.ok_or_else(|| {
                    HostError::internal("a plugin resolver is required to build a host")
                })?;
                Arc::new(DefaultLoader {
                    resolver,
                    server_addr: server.address(),
                    plugins: self.config.plugins.clone(),
                    diag: self.diag.clone(),
                }) as Arc<dyn PluginLoader>
            }
        };

        let state = RegistryState {
            loader,
            config_source: self.config_source,
            events: self.events,
            diag: self.diag.clone(),
            analyzers: HashMap::new(),
            languages: HashMap::new(),
            providers: HashMap::new(),
            plugins: Vec::new(),
        };

        let (commands, command_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_registry(command_rx, state));

        Ok(Arc::new(DefaultHost {
            server,
            commands,
            worker: Mutex::new(Some(worker)),
            closed: AtomicBool::new(false),
            diag: self.diag,
        }))
    }
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The standard host implementation.
pub struct DefaultHost {
    server: HostServer,
    commands: mpsc::UnboundedSender<RegistryCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    diag: Arc<dyn DiagSink>,
}

#[async_trait]
impl Host for DefaultHost {
    fn server_addr(&self) -> String {
        self.server.address()
    }

    fn log(&self, severity: Severity, urn: Option<Urn>, message: String) {
        let mut entry = LogEntry::new(severity, message);
        entry.urn = urn;
        self.diag.log(entry);
    }

    async fn analyzer(&self, name: &str) -> HostResult<Arc<dyn Analyzer>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RegistryCommand::Analyzer {
                name: name.to_string(),
                reply,
            })
            .map_err(|_| HostError::HostClosed)?;
        rx.await.map_err(|_| HostError::HostClosed)?
    }

    async fn provider(
        &self,
        pkg: &str,
        version: Option<&Version>,
    ) -> HostResult<Arc<dyn Provider>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RegistryCommand::Provider {
                pkg: pkg.to_string(),
                version: version.cloned(),
                reply,
            })
            .map_err(|_| HostError::HostClosed)?;
        rx.await.map_err(|_| HostError::HostClosed)?
    }

    async fn language_runtime(&self, runtime: &str) -> HostResult<Arc<dyn LanguageRuntime>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RegistryCommand::Language {
                runtime: runtime.to_string(),
                reply,
            })
            .map_err(|_| HostError::HostClosed)?;
        rx.await.map_err(|_| HostError::HostClosed)?
    }

    async fn list_plugins(&self) -> Vec<PluginInfo> {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(RegistryCommand::List { reply })
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    async fn ensure_plugins(&self, plugins: &[PluginInfo], kinds: Flags) -> HostResult<()> {
        let mut failures = LoadFailures::new();
        for plugin in plugins {
            match plugin.kind {
                PluginKind::Analyzer => {
                    if kinds.contains(Flags::ANALYZER) {
                        if let Err(e) = self.analyzer(&plugin.name).await {
                            failures.push(format!("analyzer plugin {}", plugin.name), e);
                        }
                    }
                }
                PluginKind::Language => {
                    if kinds.contains(Flags::LANGUAGE) {
                        if let Err(e) = self.language_runtime(&plugin.name).await {
                            failures.push(format!("language plugin {}", plugin.name), e);
                        }
                    }
                }
                PluginKind::Resource => {
                    if kinds.contains(Flags::RESOURCE) {
                        if let Err(e) =
                            self.provider(&plugin.name, plugin.version.as_ref()).await
                        {
                            failures.push(format!("resource plugin {}", plugin.name), e);
                        }
                    }
                }
            }
        }
        failures.into_result()
    }

    async fn get_required_plugins(
        &self,
        info: &ProgInfo,
        kinds: Flags,
    ) -> HostResult<Vec<PluginInfo>> {
        let mut plugins = Vec::new();

        if kinds.contains(Flags::LANGUAGE) {
            // The language plugin is needed first: it discovers the resource
            // plugins. Selection always picks the latest installed runtime.
            let language = self.language_runtime(&info.runtime).await?;
            plugins.push(PluginInfo::new(PluginKind::Language, info.runtime.clone()));

            if kinds.contains(Flags::RESOURCE) {
                // Static scan of resolved packages, as reported by the
                // runtime itself.
                let deps = language.get_required_plugins(info).await?;
                plugins.extend(deps);
            }
        } else if kinds.contains(Flags::RESOURCE) {
            return Err(HostError::internal(
                "cannot load resource plugins without also loading the language plugin",
            ));
        }

        if kinds.contains(Flags::ANALYZER) {
            for analyzer in &info.analyzers {
                plugins.push(PluginInfo::new(PluginKind::Analyzer, analyzer.clone()));
            }
        }

        Ok(plugins)
    }

    async fn close(&self) -> HostResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Queued loads ahead of the shutdown command complete first; anything
        // submitted afterwards observes HostClosed.
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(RegistryCommand::Shutdown { reply })
            .is_ok()
        {
            if let Ok(handles) = rx.await {
                for (name, plugin) in handles {
                    if let Err(e) = plugin.close().await {
                        info!(
                            plugin = %name,
                            error = %e,
                            "error closing plugin during shutdown; ignoring"
                        );
                    }
                }
            }
        }

        if let Some(worker) = self.worker.lock().await.take() {
            let _ = worker.await;
        }

        self.server.shutdown();
        Ok(())
    }
}

/// A handle of any kind, for shutdown.
enum LoadedPlugin {
    Analyzer(Arc<dyn Analyzer>),
    Language(Arc<dyn LanguageRuntime>),
    Provider(Arc<dyn Provider>),
}

impl LoadedPlugin {
    async fn close(&self) -> HostResult<()> {
        match self {
            Self::Analyzer(plugin) => plugin.close().await,
            Self::Language(plugin) => plugin.close().await,
            Self::Provider(plugin) => plugin.close().await,
        }
    }
}

/// One request on the registry's load lane.
enum RegistryCommand {
    Analyzer {
        name: String,
        reply: oneshot::Sender<HostResult<Arc<dyn Analyzer>>>,
    },
    Language {
        runtime: String,
        reply: oneshot::Sender<HostResult<Arc<dyn LanguageRuntime>>>,
    },
    Provider {
        pkg: String,
        version: Option<Version>,
        reply: oneshot::Sender<HostResult<Arc<dyn Provider>>>,
    },
    List {
        reply: oneshot::Sender<Vec<PluginInfo>>,
    },
    Shutdown {
        reply: oneshot::Sender<Vec<(String, LoadedPlugin)>>,
    },
}

struct AnalyzerEntry {
    plugin: Arc<dyn Analyzer>,
    info: PluginInfo,
}

struct LanguageEntry {
    plugin: Arc<dyn LanguageRuntime>,
    info: PluginInfo,
}

struct ProviderEntry {
    plugin: Arc<dyn Provider>,
    info: PluginInfo,
}

/// State owned exclusively by the registry worker.
struct RegistryState {
    loader: Arc<dyn PluginLoader>,
    config_source: Option<Arc<dyn ConfigSource>>,
    events: Option<Arc<dyn Events>>,
    diag: Arc<dyn DiagSink>,
    analyzers: HashMap<String, AnalyzerEntry>,
    languages: HashMap<String, LanguageEntry>,
    providers: HashMap<String, ProviderEntry>,
    plugins: Vec<PluginInfo>,
}

/// The registry worker: drains the load lane strictly in FIFO order.
async fn run_registry(
    mut commands: mpsc::UnboundedReceiver<RegistryCommand>,
    mut state: RegistryState,
) {
    while let Some(command) = commands.recv().await {
        match command {
            RegistryCommand::Analyzer { name, reply } => {
                let _ = reply.send(load_analyzer(&mut state, &name).await);
            }
            RegistryCommand::Language { runtime, reply } => {
                let _ = reply.send(load_language(&mut state, &runtime).await);
            }
            RegistryCommand::Provider {
                pkg,
                version,
                reply,
            } => {
                let _ = reply.send(load_provider(&mut state, &pkg, version.as_ref()).await);
            }
            RegistryCommand::List { reply } => {
                let _ = reply.send(state.plugins.clone());
            }
            RegistryCommand::Shutdown { reply } => {
                let mut handles = Vec::new();
                for (name, entry) in state.analyzers.drain() {
                    handles.push((name, LoadedPlugin::Analyzer(entry.plugin)));
                }
                for (name, entry) in state.providers.drain() {
                    handles.push((name, LoadedPlugin::Provider(entry.plugin)));
                }
                for (name, entry) in state.languages.drain() {
                    handles.push((name, LoadedPlugin::Language(entry.plugin)));
                }
                let _ = reply.send(handles);
                break;
            }
        }
    }
    debug!("registry worker stopped");
}

async fn load_analyzer(state: &mut RegistryState, name: &str) -> HostResult<Arc<dyn Analyzer>> {
    // First see if we already loaded this plugin.
    if let Some(entry) = state.analyzers.get(name) {
        return Ok(entry.plugin.clone());
    }

    let plugin = state.loader.load_analyzer(name).await?;
    let info = match plugin.get_plugin_info().await {
        Ok(info) => info,
        Err(e) => {
            let _ = plugin.close().await;
            return Err(e);
        }
    };

    // Memoize, then fire the load callback.
    state.plugins.push(info.clone());
    state.analyzers.insert(
        name.to_string(),
        AnalyzerEntry {
            plugin: plugin.clone(),
            info: info.clone(),
        },
    );
    fire_on_plugin_load(state, &info)?;

    Ok(plugin)
}

async fn load_language(
    state: &mut RegistryState,
    runtime: &str,
) -> HostResult<Arc<dyn LanguageRuntime>> {
    if let Some(entry) = state.languages.get(runtime) {
        return Ok(entry.plugin.clone());
    }

    let plugin = state.loader.load_language(runtime).await?;
    let info = match plugin.get_plugin_info().await {
        Ok(info) => info,
        Err(e) => {
            let _ = plugin.close().await;
            return Err(e);
        }
    };

    state.plugins.push(info.clone());
    state.languages.insert(
        runtime.to_string(),
        LanguageEntry {
            plugin: plugin.clone(),
            info: info.clone(),
        },
    );
    fire_on_plugin_load(state, &info)?;

    Ok(plugin)
}

async fn load_provider(
    state: &mut RegistryState,
    pkg: &str,
    version: Option<&Version>,
) -> HostResult<Arc<dyn Provider>> {
    // Cache hit: the loaded version must satisfy the request.
    if let Some(entry) = state.providers.get(pkg) {
        if let Some(requested) = version {
            match &entry.info.version {
                Some(found) if found >= requested => {}
                found => {
                    return Err(HostError::VersionMismatch {
                        name: pkg.to_string(),
                        requested: requested.to_string(),
                        found: found.as_ref().map(ToString::to_string),
                    });
                }
            }
        }
        return Ok(entry.plugin.clone());
    }

    let plugin = state.loader.load_provider(pkg, version).await?;
    let info = match plugin.get_plugin_info().await {
        Ok(info) => info,
        Err(e) => {
            let _ = plugin.close().await;
            return Err(e);
        }
    };

    // Warn if the discovered version does not satisfy the request. Not an
    // error: the resolver already did its best.
    if let Some(requested) = version {
        if !dev_mode() {
            let satisfied = info.version.as_ref().is_some_and(|found| found >= requested);
            if !satisfied {
                let found = info
                    .version
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                state.diag.log(LogEntry::new(
                    Severity::Warning,
                    format!(
                        "resource plugin {} is expected to have version >={requested}, but has \
                         {found}; the wrong version may be on your path, or this may be a bug \
                         in the plugin",
                        info.name
                    ),
                ));
            }
        }
    }

    // Configure exactly once, before the handle becomes observable. With no
    // configuration source, an empty map is used.
    let variables = match &state.config_source {
        Some(source) => match source.get_package_config(pkg) {
            Ok(variables) => variables,
            Err(e) => {
                let _ = plugin.close().await;
                return Err(HostError::ProviderConfigurationFailed {
                    pkg: pkg.to_string(),
                    message: format!("failed to fetch configuration: {e}"),
                });
            }
        },
        None => HashMap::new(),
    };
    if let Err(e) = plugin.configure(&variables).await {
        let _ = plugin.close().await;
        return Err(HostError::ProviderConfigurationFailed {
            pkg: pkg.to_string(),
            message: e.to_string(),
        });
    }

    state.plugins.push(info.clone());
    state.providers.insert(
        pkg.to_string(),
        ProviderEntry {
            plugin: plugin.clone(),
            info: info.clone(),
        },
    );
    fire_on_plugin_load(state, &info)?;

    Ok(plugin)
}

/// Fire the load callback. The entry stays in the registry even when the
/// callback errors: the plugin is live and will be closed at host shutdown.
fn fire_on_plugin_load(state: &RegistryState, info: &PluginInfo) -> HostResult<()> {
    if let Some(events) = &state.events {
        if let Err(e) = events.on_plugin_load(info) {
            warn!(plugin = %info.name, error = %e, "plugin load callback failed");
            return Err(HostError::PluginCallbackFailed {
                name: info.name.clone(),
                message: e.to_string(),
            });
        }
    }
    Ok(())
}

fn dev_mode() -> bool {
    std::env::var(DEV_MODE_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// The standard loader: resolve a binary, spawn it, connect to it.
struct DefaultLoader {
    resolver: Arc<dyn PluginResolver>,
    server_addr: String,
    plugins: PluginConfig,
    diag: Arc<dyn DiagSink>,
}

impl DefaultLoader {
    fn launch_options(&self, name: &str, path: std::path::PathBuf) -> LaunchOptions {
        LaunchOptions {
            name: name.to_string(),
            path,
            // By convention the first argument is the engine's phone-home
            // address.
            args: vec![self.server_addr.clone()],
            env: HashMap::new(),
            handshake_timeout: Duration::from_secs(self.plugins.handshake_timeout_secs),
            shutdown_timeout: Duration::from_secs(self.plugins.shutdown_timeout_secs),
        }
    }

    fn rpc_deadline(&self) -> Duration {
        Duration::from_secs(self.plugins.rpc_timeout_secs)
    }
}

#[async_trait]
impl PluginLoader for DefaultLoader {
    async fn load_analyzer(&self, name: &str) -> HostResult<Arc<dyn Analyzer>> {
        let path = self.resolver.resolve(PluginKind::Analyzer, name, None)?;
        let process = launch(self.launch_options(name, path), self.diag.clone()).await?;
        let client = AnalyzerClient::connect(process, self.rpc_deadline()).await?;
        Ok(Arc::new(client))
    }

    async fn load_language(&self, runtime: &str) -> HostResult<Arc<dyn LanguageRuntime>> {
        let path = self.resolver.resolve(PluginKind::Language, runtime, None)?;
        let process = launch(self.launch_options(runtime, path), self.diag.clone()).await?;
        let client = LanguageClient::connect(process, self.rpc_deadline()).await?;
        Ok(Arc::new(client))
    }

    async fn load_provider(
        &self,
        pkg: &str,
        version: Option<&Version>,
    ) -> HostResult<Arc<dyn Provider>> {
        let path = self.resolver.resolve(PluginKind::Resource, pkg, version)?;
        let process = launch(self.launch_options(pkg, path), self.diag.clone()).await?;
        let client = ProviderClient::connect(process, self.rpc_deadline()).await?;
        Ok(Arc::new(client))
    }
}
