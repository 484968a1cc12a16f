//! Version Identity - Finalizer and API Guard
//!
//! An [`UnresolvedVersion`] becomes a [`FinalizedVersion`] only by passing
//! the guard. Only finalized versions can be rendered into source.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::emitter::BuildConfig;
use crate::facts::{FactBundle, SemVer, VcsInfo};

/// Fixed diagnostic for a version skew, shared by the build-script check
/// and the generated compile-time assertion.
pub const VERSION_SKEW_DIAGNOSTIC: &str = "API version mismatch! Had `git fetch --tags` done?";

/// The major/minor the public interface declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiContract {
    pub major: u8,
    pub minor: u8,
}

impl ApiContract {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ApiContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid API contract `{0}`, expected <major>.<minor>")]
pub struct InvalidApiContract(pub String);

impl FromStr for ApiContract {
    type Err = InvalidApiContract;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidApiContract(s.to_string());
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{} (interface declares {expected}, packaged version is {actual})", VERSION_SKEW_DIAGNOSTIC)]
pub struct VersionSkew {
    pub expected: ApiContract,
    pub actual: SemVer,
}

/// Major/minor must match; patch and revision are informational.
pub fn check(api: ApiContract, version: &SemVer) -> Result<(), VersionSkew> {
    if version.major != api.major || version.minor != api.minor {
        return Err(VersionSkew {
            expected: api,
            actual: *version,
        });
    }
    Ok(())
}

/// The version-identity record as plain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub semver: SemVer,
    pub git: VcsInfo,
    pub sourcery: String,
}

/// Facts gathered, guard not yet run.
#[derive(Debug, Clone)]
pub struct UnresolvedVersion {
    record: VersionRecord,
}

impl UnresolvedVersion {
    /// The fingerprint is taken from `config`, never recomputed.
    pub fn new(facts: &FactBundle, config: &BuildConfig) -> Self {
        Self {
            record: VersionRecord {
                semver: facts.version,
                git: facts.git.clone(),
                sourcery: config.fingerprint.clone(),
            },
        }
    }

    pub fn finalize(self, api: ApiContract) -> Result<FinalizedVersion, VersionSkew> {
        check(api, &self.record.semver)?;
        tracing::info!(
            version = %self.record.semver,
            describe = %self.record.git.describe,
            sourcery = %self.record.sourcery,
            "version identity finalized"
        );
        Ok(FinalizedVersion {
            record: self.record,
            api,
        })
    }
}

/// Guard passed; immutable from here on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizedVersion {
    record: VersionRecord,
    api: ApiContract,
}

impl FinalizedVersion {
    pub fn record(&self) -> &VersionRecord {
        &self.record
    }

    pub fn semver(&self) -> &SemVer {
        &self.record.semver
    }

    pub fn sourcery(&self) -> &str {
        &self.record.sourcery
    }

    pub fn api(&self) -> ApiContract {
        self.api
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_contract_parses() {
        assert_eq!("0.11".parse::<ApiContract>().unwrap(), ApiContract::new(0, 11));
        assert!("0".parse::<ApiContract>().is_err());
        assert!("0.x".parse::<ApiContract>().is_err());
        assert!("0.11.1".parse::<ApiContract>().is_err());
    }

    #[test]
    fn patch_and_revision_are_not_checked() {
        let api = ApiContract::new(0, 11);
        assert!(check(api, &SemVer::new(0, 11, 0, 0)).is_ok());
        assert!(check(api, &SemVer::new(0, 11, 999, 12345)).is_ok());
    }

    #[test]
    fn skew_names_both_versions() {
        let err = check(ApiContract::new(0, 11), &SemVer::new(0, 12, 0, 0)).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with(VERSION_SKEW_DIAGNOSTIC));
        assert!(message.contains("0.11"));
        assert!(message.contains("0.12.0.0"));
    }
}
