//! Plugin identity and metadata.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;

use semver::Version;
use serde::{Deserialize, Serialize};

/// The three kinds of plugin the host knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginKind {
    /// Analyzes resources for policy compliance.
    Analyzer,
    /// Executes a user program in its source language.
    Language,
    /// Performs CRUD and invoke operations against a cloud package.
    Resource,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Analyzer => "analyzer",
            Self::Language => "language",
            Self::Resource => "resource",
        };
        f.write_str(s)
    }
}

/// Identity and metadata of a plugin.
///
/// `version` is populated for resource providers; analyzers and language
/// runtimes are currently unversioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub kind: PluginKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
}

impl PluginInfo {
    pub fn new(kind: PluginKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            version: None,
            install_path: None,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_install_path(mut self, path: PathBuf) -> Self {
        self.install_path = Some(path);
        self
    }
}

/// Bitset selecting plugin kinds, used to filter batch loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    pub const ANALYZER: Flags = Flags(1 << 0);
    pub const LANGUAGE: Flags = Flags(1 << 1);
    pub const RESOURCE: Flags = Flags(1 << 2);
    pub const ALL: Flags = Flags(0b111);

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// The flag bit for a plugin kind.
    pub const fn for_kind(kind: PluginKind) -> Flags {
        match kind {
            PluginKind::Analyzer => Self::ANALYZER,
            PluginKind::Language => Self::LANGUAGE,
            PluginKind::Resource => Self::RESOURCE,
        }
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}
