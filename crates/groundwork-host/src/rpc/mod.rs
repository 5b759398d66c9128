//! JSON-RPC plumbing over line-delimited TCP.

pub mod client;
pub mod server;

pub use client::RpcClient;
pub use server::{RpcHandler, RpcServer};
