//! Provenance Core - Build Configuration and Version Identity
//!
//! # Guarantees
//! 1. Every toggle resolves to a concrete value, or the build fails
//! 2. Resolution is a pure function of platform, build type, and requests
//! 3. The version record carries the configuration's fingerprint, never its own
//! 4. A version skew against the interface contract produces no artifact

pub mod abi;
pub mod codegen;
pub mod detect;
pub mod emitter;
pub mod facts;
pub mod hashing;
pub mod pipeline;
pub mod platform;
pub mod toggles;
pub mod validation;
pub mod version;

pub use abi::{GitInfo, RawStr, VersionInfo};
pub use emitter::{emit, resolve_toggles, BuildConfig, BuildType, ConfigError, Descriptors};
pub use facts::{FactBundle, FactError, SemVer, VcsInfo};
pub use hashing::{canonical_json, derive_fingerprint, digest_tree};
pub use pipeline::{Provenance, ProvenanceError, ProvenancePipeline};
pub use platform::{LockingBackend, OsFamily, Platform};
pub use toggles::{FeatureRequests, Request, ResolvedToggles, ToggleKey, ToggleValue};
pub use validation::{ConfigViolation, ValidationResult};
pub use version::{ApiContract, FinalizedVersion, UnresolvedVersion, VersionSkew};

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_level`. Safe to call more than once.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
