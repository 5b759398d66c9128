//! The Groundwork plugin host.
//!
//! This crate implements the process side of the plugin contract defined in
//! `groundwork-plugin-api`:
//!
//! - [`launcher`] spawns plugin binaries, reads their handshake, and owns
//!   their lifetime;
//! - [`rpc`] provides the JSON-RPC client and server plumbing both
//!   directions run on;
//! - [`clients`] are the typed stubs (`AnalyzerClient`, `LanguageClient`,
//!   `ProviderClient`) the registry hands out;
//! - [`host`] is the [`Host`] itself: lazy, memoized, race-free plugin
//!   loading through a single serialized worker;
//! - [`server`] is the phone-home endpoint plugins log through;
//! - [`monitor`] is the Resource Monitor the language runtime registers
//!   resources against.

pub mod clients;
pub mod host;
pub mod launcher;
pub mod monitor;
pub mod rpc;
pub mod server;

pub use host::{DefaultHost, Host, HostBuilder, PluginLoader};
pub use launcher::LaunchedPlugin;
pub use monitor::{ProviderSource, ResourceMonitor, ResourceRecord};
pub use rpc::{RpcClient, RpcHandler, RpcServer};
pub use server::HostServer;
