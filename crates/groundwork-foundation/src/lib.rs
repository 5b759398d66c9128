//! Shared foundation types for the Groundwork engine.
//!
//! This crate holds the types every other Groundwork crate agrees on: the
//! [`HostError`] taxonomy, the recursive [`PropertyValue`] model used for
//! resource property bags, opaque resource [`Urn`]s, and the [`DiagSink`]
//! seam through which diagnostics flow out of the engine.

pub mod diag;
pub mod error;
pub mod property;
pub mod urn;

pub use diag::{DiagSink, LogEntry, Severity, TracingSink};
pub use error::{HostError, HostResult, LoadFailures};
pub use property::{PropertyMap, PropertyValue};
pub use urn::Urn;
