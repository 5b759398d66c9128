//! Stable resource identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A stable, engine-assigned identifier for a resource.
///
/// URNs are derived deterministically from `(parent?, type, name)` and are
/// opaque to everything outside the engine: callers compare and store them
/// but never parse them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Urn(String);

impl Urn {
    /// Derive the URN for a resource.
    ///
    /// The same `(parent, type, name)` triple always yields the same URN
    /// within a run; distinct triples yield distinct URNs.
    pub fn derive(parent: Option<&Urn>, resource_type: &str, name: &str) -> Self {
        let parent = parent.map(|p| p.0.as_str()).unwrap_or("");
        Urn(format!("urn:groundwork:{parent}::{resource_type}::{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Urn {
    fn from(value: String) -> Self {
        Urn(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = Urn::derive(None, "aws:ec2/vpc", "main");
        let b = Urn::derive(None, "aws:ec2/vpc", "main");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_triples_yield_distinct_urns() {
        let root = Urn::derive(None, "aws:ec2/vpc", "main");
        let child = Urn::derive(Some(&root), "aws:ec2/subnet", "main");
        let sibling = Urn::derive(Some(&root), "aws:ec2/subnet", "other");
        assert_ne!(root, child);
        assert_ne!(child, sibling);
    }

    #[test]
    fn serde_is_transparent() {
        let urn = Urn::derive(None, "aws:ec2/vpc", "main");
        let encoded = serde_json::to_string(&urn).unwrap();
        assert_eq!(encoded, format!("\"{urn}\""));
        let decoded: Urn = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, urn);
    }
}
