//! Code Generation - One Template, One Fact Bundle
//!
//! Renders the configuration artifact, the version-identity artifact, the
//! export manifest, and the cargo directives for a build script.

use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use crate::emitter::BuildConfig;
use crate::platform::{LockingBackend, OsFamily, Platform};
use crate::toggles::{ToggleKey, ToggleValue};
use crate::version::{FinalizedVersion, VERSION_SKEW_DIAGNOSTIC};

pub const BUILD_CONFIG_FILE: &str = "build_config.rs";
pub const VERSION_INFO_FILE: &str = "version_info.rs";
pub const EXPORTS_FILE: &str = "exports.txt";

pub const VERSION_SYMBOL: &str = "provenance_version";
pub const SOURCERY_ANCHOR_SYMBOL: &str = "provenance_sourcery_anchor";

/// Symbols that must survive linking; provenance tooling resolves them by name.
pub const EXPORTED_SYMBOLS: [&str; 2] = [VERSION_SYMBOL, SOURCERY_ANCHOR_SYMBOL];

const HEADER: &str = "// @generated by provenance-core. Do not edit.\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedArtifacts {
    pub build_config: String,
    pub version_info: String,
    pub export_manifest: String,
    pub directives: Vec<String>,
}

impl GeneratedArtifacts {
    pub fn write_to(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(BUILD_CONFIG_FILE), &self.build_config)?;
        fs::write(dir.join(VERSION_INFO_FILE), &self.version_info)?;
        fs::write(dir.join(EXPORTS_FILE), &self.export_manifest)?;
        tracing::debug!(dir = %dir.display(), "artifacts written");
        Ok(())
    }
}

/// Rendering takes a [`FinalizedVersion`], so nothing is generated for a
/// build that failed the guard.
pub fn render(config: &BuildConfig, version: &FinalizedVersion) -> GeneratedArtifacts {
    GeneratedArtifacts {
        build_config: render_build_config(config),
        version_info: render_version_info(version),
        export_manifest: export_manifest(),
        directives: cfg_directives(config),
    }
}

fn rust_str(s: &str) -> String {
    format!("{:?}", s)
}

// Facts are validated NUL-free before they get here.
fn c_str(s: &str) -> String {
    format!("c{:?}", s)
}

fn locking_variant(backend: LockingBackend) -> &'static str {
    match backend {
        LockingBackend::Win32Files => "Win32Files",
        LockingBackend::SystemV => "SystemV",
        LockingBackend::Posix1988 => "Posix1988",
        LockingBackend::Posix2001 => "Posix2001",
        LockingBackend::Posix2008 => "Posix2008",
    }
}

pub fn render_build_config(config: &BuildConfig) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');

    for (key, value) in config.toggles.entries() {
        let line = match value {
            ToggleValue::Switch(on) => format!("pub const {}: bool = {};\n", key.const_name(), on),
            ToggleValue::Locking(backend) => format!(
                "pub const {}: ::provenance_core::LockingBackend = ::provenance_core::LockingBackend::{};\n",
                key.const_name(),
                locking_variant(backend)
            ),
        };
        out.push_str(&line);
    }

    let d = &config.descriptors;
    out.push('\n');
    for (name, value) in [
        ("BUILD_TIMESTAMP", &d.timestamp),
        ("BUILD_TARGET", &d.target),
        ("BUILD_TYPE", &d.build_type),
        ("BUILD_COMPILER", &d.compiler),
        ("BUILD_FLAGS", &d.flags),
        ("BUILD_OPTIONS", &d.options),
        ("BUILD_SOURCERY", &config.fingerprint),
    ] {
        let _ = writeln!(out, "pub const {}: &str = {};", name, rust_str(value));
    }
    out
}

pub fn render_version_info(version: &FinalizedVersion) -> String {
    let record = version.record();
    let v = &record.semver;
    let git = &record.git;

    let mut out = String::from(HEADER);
    let _ = write!(
        out,
        r#"
pub const VERSION_MAJOR: u8 = {major};
pub const VERSION_MINOR: u8 = {minor};
pub const VERSION_RELEASE: u16 = {patch};
pub const VERSION_REVISION: u32 = {revision};

const _: () = assert!(
    VERSION_MAJOR == crate::API_VERSION_MAJOR && VERSION_MINOR == crate::API_VERSION_MINOR,
    {diagnostic}
);

const SOURCERY: &::core::ffi::CStr = {sourcery};

#[used]
#[no_mangle]
#[allow(non_upper_case_globals)]
pub static {version_symbol}: ::provenance_core::abi::VersionInfo = ::provenance_core::abi::VersionInfo {{
    major: VERSION_MAJOR,
    minor: VERSION_MINOR,
    release: VERSION_RELEASE,
    revision: VERSION_REVISION,
    git: ::provenance_core::abi::GitInfo {{
        datetime: ::provenance_core::abi::RawStr::new({datetime}),
        commit: ::provenance_core::abi::RawStr::new({commit}),
        root: ::provenance_core::abi::RawStr::new({root}),
        describe: ::provenance_core::abi::RawStr::new({describe}),
    }},
    sourcery: ::provenance_core::abi::RawStr::new(SOURCERY),
}};

#[used]
#[no_mangle]
#[allow(non_upper_case_globals)]
pub static {anchor_symbol}: ::provenance_core::abi::RawStr = ::provenance_core::abi::RawStr::new(SOURCERY);
"#,
        major = v.major,
        minor = v.minor,
        patch = v.patch,
        revision = v.revision,
        diagnostic = rust_str(VERSION_SKEW_DIAGNOSTIC),
        sourcery = c_str(&record.sourcery),
        version_symbol = VERSION_SYMBOL,
        anchor_symbol = SOURCERY_ANCHOR_SYMBOL,
        datetime = c_str(&git.datetime),
        commit = c_str(&git.commit),
        root = c_str(&git.root),
        describe = c_str(&git.describe),
    );
    out
}

pub fn export_manifest() -> String {
    let mut out = String::new();
    for symbol in EXPORTED_SYMBOLS {
        out.push_str(symbol);
        out.push('\n');
    }
    out
}

/// `rustc-check-cfg` and `rustc-cfg` lines for every resolved toggle.
pub fn cfg_directives(config: &BuildConfig) -> Vec<String> {
    let mut directives = vec![];
    for (key, value) in config.toggles.entries() {
        match value {
            ToggleValue::Locking(backend) => {
                let values: Vec<String> = LockingBackend::ALL
                    .iter()
                    .map(|b| rust_str(b.as_str()))
                    .collect();
                directives.push(format!(
                    "cargo::rustc-check-cfg=cfg({}, values({}))",
                    key.cfg_name(),
                    values.join(", ")
                ));
                directives.push(format!(
                    "cargo::rustc-cfg={}={}",
                    key.cfg_name(),
                    rust_str(backend.as_str())
                ));
            }
            ToggleValue::Switch(on) => {
                directives.push(format!("cargo::rustc-check-cfg=cfg({})", key.cfg_name()));
                if on {
                    directives.push(format!("cargo::rustc-cfg={}", key.cfg_name()));
                }
            }
        }
    }
    directives
}

/// Linker arguments that keep the exported symbols in a `cdylib`.
///
/// `host` must be the triple actually being linked, not the one the fact
/// bundle describes.
pub fn link_directives(host: &Platform) -> Vec<String> {
    let flag = |symbol: &str| match host.os {
        OsFamily::MacOs | OsFamily::Ios => Some(format!("-Wl,-u,_{}", symbol)),
        OsFamily::Linux | OsFamily::Android | OsFamily::FreeBsd | OsFamily::NetBsd => {
            Some(format!("-Wl,--undefined={}", symbol))
        }
        // MSVC and the rest export `#[no_mangle]` statics without help.
        _ => None,
    };
    EXPORTED_SYMBOLS
        .iter()
        .filter_map(|symbol| flag(*symbol))
        .map(|arg| format!("cargo::rustc-cdylib-link-arg={}", arg))
        .collect()
}

/// Env vars a build script should watch, one per overridable fact.
pub fn watched_env_vars(prefix: &str) -> Vec<String> {
    let mut vars: Vec<String> = [
        "FACTS",
        "TIMESTAMP",
        "TARGET",
        "BUILD_TYPE",
        "COMPILER",
        "FLAGS",
        "FINGERPRINT",
        "SOURCE_DIGEST",
        "VERSION__MAJOR",
        "VERSION__MINOR",
        "VERSION__PATCH",
        "VERSION__REVISION",
        "GIT__DATETIME",
        "GIT__COMMIT",
        "GIT__ROOT",
        "GIT__DESCRIBE",
    ]
    .iter()
    .map(|name| format!("{}_{}", prefix, name))
    .collect();
    vars.extend(
        ToggleKey::ALL
            .iter()
            .map(|key| format!("{}_FEATURES__{}", prefix, key.const_name())),
    );
    vars
}
