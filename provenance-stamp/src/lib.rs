//! Provenance Stamp - the host library's build identity.
//!
//! `build.rs` generates two artifacts into `OUT_DIR`:
//! - `build_config.rs`: resolved toggles and build descriptors
//! - `version_info.rs`: version constants, the API guard, and the exported
//!   `provenance_version` / `provenance_sourcery_anchor` statics
//!
//! Resolved toggles are also available to conditional compilation as
//! `cfg(provenance_<toggle>)` and `cfg(provenance_locking = "<family>")`.

use serde::Serialize;

mod api;
pub use api::{API_VERSION_MAJOR, API_VERSION_MINOR};

pub use provenance_core::abi::{GitInfo, RawStr, VersionInfo};
pub use provenance_core::LockingBackend;

/// Resolved configuration artifact.
pub mod build_config {
    include!(concat!(env!("OUT_DIR"), "/build_config.rs"));
}

/// Version-identity artifact.
pub mod version {
    include!(concat!(env!("OUT_DIR"), "/version_info.rs"));
}

pub use version::{provenance_sourcery_anchor, provenance_version};

/// Symbols the build keeps alive for external tooling, one per line.
pub const EXPORT_MANIFEST: &str = include_str!(concat!(env!("OUT_DIR"), "/exports.txt"));

pub fn version_info() -> &'static VersionInfo {
    &version::provenance_version
}

/// The build fingerprint, read through the standalone anchor.
pub fn sourcery() -> &'static str {
    version::provenance_sourcery_anchor.as_str()
}

pub fn exported_symbols() -> impl Iterator<Item = &'static str> {
    EXPORT_MANIFEST.lines().filter(|l| !l.trim().is_empty())
}

/// Build metadata captured at compile time.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: String,
    pub describe: &'static str,
    pub commit: &'static str,
    pub timestamp: &'static str,
    pub target: &'static str,
    pub build_type: &'static str,
    pub compiler: &'static str,
    pub flags: &'static str,
    pub options: &'static str,
    pub locking: &'static str,
    pub sourcery: &'static str,
}

pub fn build_info() -> BuildInfo {
    let info = version_info();
    BuildInfo {
        version: info.semver().to_string(),
        describe: info.git.describe.as_str(),
        commit: info.git.commit.as_str(),
        timestamp: build_config::BUILD_TIMESTAMP,
        target: build_config::BUILD_TARGET,
        build_type: build_config::BUILD_TYPE,
        compiler: build_config::BUILD_COMPILER,
        flags: build_config::BUILD_FLAGS,
        options: build_config::BUILD_OPTIONS,
        locking: build_config::LOCKING.as_str(),
        sourcery: build_config::BUILD_SOURCERY,
    }
}

/// `assert!` that stays on in release builds when the build configuration
/// forces assertions.
#[macro_export]
macro_rules! stamp_assert {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) || $crate::build_config::FORCE_ASSERTIONS {
            assert!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_matches_constants() {
        let info = build_info();
        assert_eq!(info.sourcery, sourcery());
        assert_eq!(info.options, build_config::BUILD_OPTIONS);
        assert!(info.options.contains("locking="));
    }

    #[test]
    fn stamp_assert_passes_on_truth() {
        stamp_assert!(1 + 1 == 2, "arithmetic");
    }

    #[test]
    fn locking_cfg_matches_constant() {
        let from_cfg = if cfg!(provenance_locking = "win32files") {
            LockingBackend::Win32Files
        } else if cfg!(provenance_locking = "sysv") {
            LockingBackend::SystemV
        } else if cfg!(provenance_locking = "posix1988") {
            LockingBackend::Posix1988
        } else if cfg!(provenance_locking = "posix2001") {
            LockingBackend::Posix2001
        } else {
            LockingBackend::Posix2008
        };
        assert_eq!(from_cfg, build_config::LOCKING);
    }

    #[test]
    fn switch_cfgs_match_constants() {
        assert_eq!(cfg!(provenance_force_assertions), build_config::FORCE_ASSERTIONS);
        assert_eq!(cfg!(provenance_use_ofdlocks), build_config::USE_OFDLOCKS);
        assert_eq!(cfg!(provenance_lto), build_config::LTO);
        assert_eq!(cfg!(provenance_asan), build_config::ASAN);
        assert_eq!(cfg!(provenance_ubsan), build_config::UBSAN);
    }
}
