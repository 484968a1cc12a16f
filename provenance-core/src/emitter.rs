//! BuildConfig Emitter - Resolve Toggles, Collect Descriptors
//!
//! `resolve_toggles` is pure: the same (platform, build type, requests)
//! always produces the same toggles, or the same error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::facts::FactBundle;
use crate::hashing::{derive_fingerprint, FingerprintInputs};
use crate::platform::Platform;
use crate::toggles::{FeatureRequests, ResolvedToggles};
use crate::validation::{ConfigViolation, Validator};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Contradictory feature requests for {target}: {}", summarize(.violations))]
    Contradiction {
        target: String,
        violations: Vec<ConfigViolation>,
    },

    #[error("Unknown build type: {0}")]
    UnknownBuildType(String),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

fn summarize(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}={} ({})", v.toggle, v.requested, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildType {
    Debug,
    Release,
    RelWithDebInfo,
    MinSizeRel,
}

impl BuildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "Debug",
            Self::Release => "Release",
            Self::RelWithDebInfo => "RelWithDebInfo",
            Self::MinSizeRel => "MinSizeRel",
        }
    }

    pub fn optimized(&self) -> bool {
        *self != Self::Debug
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "dev" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            "relwithdebinfo" => Ok(Self::RelWithDebInfo),
            "minsizerel" => Ok(Self::MinSizeRel),
            _ => Err(ConfigError::UnknownBuildType(s.to_string())),
        }
    }
}

/// Resolve every `auto` request for `platform`; reject contradictions.
pub fn resolve_toggles(
    platform: &Platform,
    build_type: BuildType,
    requests: &FeatureRequests,
) -> Result<ResolvedToggles, ConfigError> {
    let validation = Validator::new().validate(requests, platform);
    // `LockingSupportRule` reports a target with no family for `auto`.
    let locking = requests.locking.explicit().or_else(|| platform.native_locking());
    let (true, Some(locking)) = (validation.valid, locking) else {
        for v in &validation.violations {
            tracing::warn!(rule = %v.rule, toggle = %v.toggle, requested = %v.requested, "{}", v.message);
        }
        return Err(ConfigError::Contradiction {
            target: validation.target,
            violations: validation.violations,
        });
    };

    let toggles = ResolvedToggles {
        force_assertions: requests.force_assertions.resolve_or(build_type == BuildType::Debug),
        valgrind: requests.valgrind.resolve_or(false),
        gprof: requests.gprof.resolve_or(false),
        gcov: requests.gcov.resolve_or(false),
        asan: requests.asan.resolve_or(false),
        ubsan: requests.ubsan.resolve_or(false),
        env_checkpid: requests
            .env_checkpid
            .resolve_or(platform.is_unix() && !platform.can_exclude_from_fork()),
        locking,
        trust_rtc: requests.trust_rtc.resolve_or(!platform.monotonic_clock_reliable()),
        disable_pagechecks: requests.disable_pagechecks.resolve_or(false),
        without_msvc_crt: requests.without_msvc_crt.resolve_or(false),
        osx_speed_insteadof_durability: requests.osx_speed_insteadof_durability.resolve_or(false),
        disable_gnu_source: requests.disable_gnu_source.resolve_or(false),
        use_ofdlocks: requests.use_ofdlocks.resolve_or(platform.has_ofd_locks()),
        txn_checkowner: requests.txn_checkowner.resolve_or(true),
        lto: requests.lto.resolve_or(build_type.optimized()),
    };

    for (key, value) in toggles.entries() {
        tracing::debug!(toggle = %key, value = %value, requested = requests.rendered(key), "toggle resolved");
    }

    Ok(toggles)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptors {
    pub timestamp: String,
    pub target: String,
    pub build_type: String,
    pub compiler: String,
    pub flags: String,
    pub options: String,
}

/// The configuration artifact: resolved toggles, descriptors, fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub platform: Platform,
    pub build_type: BuildType,
    pub toggles: ResolvedToggles,
    pub descriptors: Descriptors,
    pub fingerprint: String,
}

/// Materialize a [`BuildConfig`] from a fact bundle.
pub fn emit(facts: &FactBundle) -> Result<BuildConfig, ConfigError> {
    let platform = Platform::from_triple(&facts.target);
    let build_type: BuildType = facts.build_type.parse()?;
    let toggles = resolve_toggles(&platform, build_type, &facts.features)?;

    let fingerprint = match &facts.fingerprint {
        Some(supplied) => supplied.clone(),
        None => {
            let inputs = FingerprintInputs::new(
                &facts.source_digest,
                &toggles,
                &facts.target,
                &facts.build_type,
                &facts.compiler,
                &facts.flags,
            );
            derive_fingerprint(&inputs, &facts.version, &facts.git)?
        }
    };

    let descriptors = Descriptors {
        timestamp: facts.timestamp.clone(),
        target: facts.target.clone(),
        build_type: facts.build_type.clone(),
        compiler: facts.compiler.clone(),
        flags: facts.flags.clone(),
        options: toggles.options_string(),
    };

    tracing::debug!(triple = %platform.triple, %build_type, %fingerprint, "build config emitted");

    Ok(BuildConfig {
        platform,
        build_type,
        toggles,
        descriptors,
        fingerprint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::LockingBackend;
    use crate::toggles::Request;

    fn linux() -> Platform {
        Platform::from_triple("x86_64-unknown-linux-gnu")
    }

    #[test]
    fn build_type_accepts_cargo_and_cmake_labels() {
        assert_eq!("debug".parse::<BuildType>().unwrap(), BuildType::Debug);
        assert_eq!("RelWithDebInfo".parse::<BuildType>().unwrap(), BuildType::RelWithDebInfo);
        assert!("fast".parse::<BuildType>().is_err());
    }

    #[test]
    fn linux_auto_defaults() {
        let t = resolve_toggles(&linux(), BuildType::Release, &FeatureRequests::default()).unwrap();
        assert_eq!(t.locking, LockingBackend::Posix2008);
        assert!(t.use_ofdlocks);
        assert!(!t.env_checkpid);
        assert!(!t.trust_rtc);
        assert!(!t.force_assertions);
        assert!(t.lto);
        assert!(t.txn_checkowner);
        assert!(!t.asan);
        assert!(!t.ubsan);
    }

    #[test]
    fn debug_builds_force_assertions_unless_pinned() {
        let t = resolve_toggles(&linux(), BuildType::Debug, &FeatureRequests::default()).unwrap();
        assert!(t.force_assertions);
        assert!(!t.lto);

        let pinned = FeatureRequests {
            force_assertions: Request::Explicit(false),
            ..Default::default()
        };
        let t = resolve_toggles(&linux(), BuildType::Debug, &pinned).unwrap();
        assert!(!t.force_assertions);
    }

    #[test]
    fn darwin_needs_pid_check_and_sysv() {
        let p = Platform::from_triple("aarch64-apple-darwin");
        let t = resolve_toggles(&p, BuildType::Release, &FeatureRequests::default()).unwrap();
        assert_eq!(t.locking, LockingBackend::SystemV);
        assert!(t.env_checkpid);
        assert!(!t.use_ofdlocks);
    }

    #[test]
    fn windows_has_no_pid_check() {
        let p = Platform::from_triple("x86_64-pc-windows-msvc");
        let t = resolve_toggles(&p, BuildType::Release, &FeatureRequests::default()).unwrap();
        assert_eq!(t.locking, LockingBackend::Win32Files);
        assert!(!t.env_checkpid);
    }

    #[test]
    fn unreliable_clock_trusts_rtc() {
        let p = Platform::from_triple("x86_64-unknown-openbsd");
        let t = resolve_toggles(&p, BuildType::Release, &FeatureRequests::default()).unwrap();
        assert!(t.trust_rtc);
    }

    #[test]
    fn contradiction_lists_violations() {
        let requests = FeatureRequests {
            locking: Request::Explicit(LockingBackend::Posix2008),
            ..Default::default()
        };
        let p = Platform::from_triple("aarch64-apple-darwin");
        let err = resolve_toggles(&p, BuildType::Release, &requests).unwrap_err();
        match &err {
            ConfigError::Contradiction { violations, .. } => assert_eq!(violations.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("locking=posix2008"));
    }

    #[test]
    fn no_locking_target_fails() {
        let p = Platform::from_triple("wasm32-unknown-unknown");
        let err = resolve_toggles(&p, BuildType::Release, &FeatureRequests::default()).unwrap_err();
        match err {
            ConfigError::Contradiction { violations, .. } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].rule, "locking_support");
                assert_eq!(violations[0].requested, "auto");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
