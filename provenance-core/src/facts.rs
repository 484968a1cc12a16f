//! Fact Bundle - Everything the Packager Knows About a Build
//!
//! Facts are layered: detected values first, then an optional fact file,
//! then `PROVENANCE_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::toggles::FeatureRequests;

pub const ENV_PREFIX: &str = "PROVENANCE";

#[derive(Debug, Error)]
pub enum FactError {
    #[error("Failed to load facts: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Fact `{0}` contains an interior NUL byte")]
    InteriorNul(&'static str),

    #[error("Fact `timestamp` is not RFC 3339: {value}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Fact `{0}` must not be empty")]
    Missing(&'static str),
}

/// (major, minor, patch, revision). Revision counts commits since the last
/// tagged patch release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SemVer {
    pub major: u8,
    pub minor: u8,
    pub patch: u16,
    pub revision: u32,
}

impl SemVer {
    pub const fn new(major: u8, minor: u8, patch: u16, revision: u32) -> Self {
        Self { major, minor, patch, revision }
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.revision)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VcsInfo {
    pub datetime: String,
    pub commit: String,
    pub root: String,
    pub describe: String,
}

impl VcsInfo {
    /// First seven characters of the commit hash.
    pub fn short_commit(&self) -> &str {
        let end = self
            .commit
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.commit.len());
        &self.commit[..end]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactBundle {
    pub timestamp: String,
    pub target: String,
    pub build_type: String,
    pub compiler: String,
    #[serde(default)]
    pub flags: String,
    pub version: SemVer,
    #[serde(default)]
    pub git: VcsInfo,
    /// Supplied by the packager. Derived from content when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub source_digest: String,
    #[serde(default)]
    pub features: FeatureRequests,
}

impl FactBundle {
    pub fn validate(&self) -> Result<(), FactError> {
        if self.target.trim().is_empty() {
            return Err(FactError::Missing("target"));
        }
        if self.build_type.trim().is_empty() {
            return Err(FactError::Missing("build_type"));
        }

        chrono::DateTime::parse_from_rfc3339(&self.timestamp).map_err(|source| {
            FactError::InvalidTimestamp {
                value: self.timestamp.clone(),
                source,
            }
        })?;

        // Everything below is emitted as a C string.
        let strings: [(&'static str, &str); 10] = [
            ("timestamp", self.timestamp.as_str()),
            ("target", self.target.as_str()),
            ("build_type", self.build_type.as_str()),
            ("compiler", self.compiler.as_str()),
            ("flags", self.flags.as_str()),
            ("git.datetime", self.git.datetime.as_str()),
            ("git.commit", self.git.commit.as_str()),
            ("git.root", self.git.root.as_str()),
            ("git.describe", self.git.describe.as_str()),
            ("fingerprint", self.fingerprint.as_deref().unwrap_or_default()),
        ];
        for (name, value) in strings {
            if value.contains('\0') {
                return Err(FactError::InteriorNul(name));
            }
        }

        if matches!(&self.fingerprint, Some(f) if f.trim().is_empty()) {
            return Err(FactError::Missing("fingerprint"));
        }

        Ok(())
    }
}

/// Layer `detected` facts, an optional fact file (JSON or TOML, chosen by
/// extension), and `PROVENANCE_*` environment overrides.
pub fn load(detected: &FactBundle, file: Option<&Path>) -> Result<FactBundle, FactError> {
    load_with_prefix(detected, file, ENV_PREFIX)
}

pub fn load_with_prefix(
    detected: &FactBundle,
    file: Option<&Path>,
    env_prefix: &str,
) -> Result<FactBundle, FactError> {
    let mut builder = config::Config::builder().add_source(config::Config::try_from(detected)?);
    if let Some(path) = file {
        builder = builder.add_source(config::File::from(path).required(true));
    }
    let settings = builder
        // Overrides stay strings: a fingerprint like `00123` must not become
        // an integer. Numeric and request fields parse from strings anyway.
        .add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let facts: FactBundle = settings.try_deserialize()?;
    tracing::debug!(
        triple = %facts.target,
        version = %facts.version,
        fact_file = ?file,
        "facts loaded"
    );
    Ok(facts)
}

/// Load a fact file on its own, without detection or environment layers.
pub fn from_file(path: &Path) -> Result<FactBundle, FactError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path).required(true))
        .build()?;
    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FactBundle {
        FactBundle {
            timestamp: "2021-10-27T23:52:32Z".to_string(),
            target: "x86_64-unknown-linux-gnu".to_string(),
            build_type: "Release".to_string(),
            compiler: "rustc 1.80.0".to_string(),
            flags: "-C opt-level=3".to_string(),
            version: SemVer::new(0, 11, 1, 2),
            git: VcsInfo {
                datetime: "2021-10-24T20:43:37+03:00".to_string(),
                commit: "710fc95d9a3fd58e37449f3f7237195546542a75".to_string(),
                root: "f33a083671172dd0507eef4ee009803e729a3ce3".to_string(),
                describe: "v0.11.1-2-g710fc95".to_string(),
            },
            fingerprint: None,
            source_digest: String::new(),
            features: FeatureRequests::default(),
        }
    }

    #[test]
    fn sample_is_valid() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn short_commit_truncates() {
        assert_eq!(sample().git.short_commit(), "710fc95");
        assert_eq!(VcsInfo::default().short_commit(), "");
    }

    #[test]
    fn interior_nul_rejected() {
        let mut facts = sample();
        facts.compiler = "rustc\0evil".to_string();
        assert!(matches!(facts.validate(), Err(FactError::InteriorNul("compiler"))));
    }

    #[test]
    fn bad_timestamp_rejected() {
        let mut facts = sample();
        facts.timestamp = "yesterday".to_string();
        assert!(matches!(facts.validate(), Err(FactError::InvalidTimestamp { .. })));
    }

    #[test]
    fn empty_fingerprint_rejected() {
        let mut facts = sample();
        facts.fingerprint = Some("  ".to_string());
        assert!(matches!(facts.validate(), Err(FactError::Missing("fingerprint"))));
    }
}
