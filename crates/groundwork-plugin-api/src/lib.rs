//! Plugin contracts for the Groundwork engine.
//!
//! A Groundwork plugin is a standalone executable speaking newline-delimited
//! JSON-RPC 2.0 over a local TCP socket. This crate defines everything both
//! sides of that boundary agree on:
//!
//! - the plugin taxonomy ([`PluginKind`], [`PluginInfo`], [`Flags`]);
//! - the capability traits the host consumes ([`Analyzer`],
//!   [`LanguageRuntime`], [`Provider`]) and their payload types;
//! - the wire protocol frames and method names ([`protocol`]);
//! - the startup handshake ([`handshake`]);
//! - the interfaces the engine injects into the host ([`PluginResolver`],
//!   [`ConfigSource`], [`Events`]).
//!
//! The host side (process launching, typed clients, the registry) lives in
//! `groundwork-host`.

pub mod handshake;
pub mod info;
pub mod protocol;
pub mod resource;
pub mod traits;

pub use info::{Flags, PluginInfo, PluginKind};
pub use resource::{
    ReadResourceParams, ReadResourceResult, RegisterResourceOutputsParams, RegisterResourceResult,
    ResourceRegistration,
};
pub use traits::{
    AnalyzeDiagnostic, Analyzer, CheckFailure, CheckResult, ConfigSource, CreateResult,
    DiffResult, Events, InvokeResult, LanguageRuntime, PluginResolver, ProgInfo, Provider,
    RunInfo, RunResult, UpdateResult,
};
