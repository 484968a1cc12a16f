//! Validation System - Platform Constraint Rules
//!
//! Rules inspect explicit feature requests and produce structured
//! violations. `auto` requests never violate anything, except where a
//! target has no value `auto` could resolve to.

use serde::{Deserialize, Serialize};

use crate::platform::{OsFamily, Platform};
use crate::toggles::{FeatureRequests, Request, ToggleKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigViolation {
    pub rule: String,
    pub toggle: ToggleKey,
    pub message: String,
    pub requested: String,
    pub target: String,
    pub remediation: Vec<String>,
}

impl ConfigViolation {
    fn new(rule: &str, toggle: ToggleKey, requests: &FeatureRequests, platform: &Platform) -> Self {
        Self {
            rule: rule.to_string(),
            toggle,
            message: String::new(),
            requested: requests.rendered(toggle).to_string(),
            target: platform.triple.clone(),
            remediation: vec![],
        }
    }

    fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    fn remedy(mut self, remediation: impl Into<String>) -> Self {
        self.remediation.push(remediation.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ConfigViolation>,
    pub target: String,
}

/// Constraint rule trait - produces violations
pub trait ConstraintRule {
    fn name(&self) -> &'static str;
    fn check(&self, requests: &FeatureRequests, platform: &Platform) -> Vec<ConfigViolation>;
}

// --- Concrete Rules ---

pub struct LockingSupportRule;

impl ConstraintRule for LockingSupportRule {
    fn name(&self) -> &'static str { "locking_support" }

    fn check(&self, requests: &FeatureRequests, platform: &Platform) -> Vec<ConfigViolation> {
        match requests.locking {
            Request::Auto if platform.native_locking().is_none() => {
                vec![ConfigViolation::new(self.name(), ToggleKey::Locking, requests, platform)
                    .message(format!("{} has no native locking family", platform.os))
                    .remedy("Build for a target with inter-process locking")]
            }
            Request::Explicit(backend) if !platform.supports_locking(backend) => {
                let supported: Vec<_> = platform
                    .locking_families()
                    .iter()
                    .map(|b| b.as_str())
                    .collect();
                vec![ConfigViolation::new(self.name(), ToggleKey::Locking, requests, platform)
                    .message(format!("Locking backend {} is not available on {}", backend, platform.os))
                    .remedy(format!("Request one of: {}", supported.join(", ")))
                    .remedy("Or leave `locking` as auto")]
            }
            _ => vec![],
        }
    }
}

/// Switches that only mean something on one platform family.
pub struct PlatformScopeRule;

impl ConstraintRule for PlatformScopeRule {
    fn name(&self) -> &'static str { "platform_scope" }

    fn check(&self, requests: &FeatureRequests, platform: &Platform) -> Vec<ConfigViolation> {
        let mut violations = vec![];

        if requests.without_msvc_crt == Request::Explicit(true) && !platform.is_windows() {
            violations.push(
                ConfigViolation::new(self.name(), ToggleKey::WithoutMsvcCrt, requests, platform)
                    .message("CRT bypass applies to Windows targets only")
                    .remedy("Drop `without_msvc_crt` or set it to off"),
            );
        }

        if requests.osx_speed_insteadof_durability == Request::Explicit(true) && !platform.is_apple() {
            violations.push(
                ConfigViolation::new(
                    self.name(),
                    ToggleKey::OsxSpeedInsteadofDurability,
                    requests,
                    platform,
                )
                .message("Speed-over-durability trade-off applies to Apple targets only")
                .remedy("Drop `osx_speed_insteadof_durability` or set it to off"),
            );
        }

        if requests.disable_gnu_source == Request::Explicit(true) && platform.is_windows() {
            violations.push(
                ConfigViolation::new(self.name(), ToggleKey::DisableGnuSource, requests, platform)
                    .message("POSIX extension source has no meaning on Windows")
                    .remedy("Drop `disable_gnu_source` or set it to off"),
            );
        }

        violations
    }
}

pub struct OfdLockRule;

impl ConstraintRule for OfdLockRule {
    fn name(&self) -> &'static str { "ofd_locks" }

    fn check(&self, requests: &FeatureRequests, platform: &Platform) -> Vec<ConfigViolation> {
        if requests.use_ofdlocks == Request::Explicit(true) && !platform.has_ofd_locks() {
            vec![ConfigViolation::new(self.name(), ToggleKey::UseOfdlocks, requests, platform)
                .message(format!("Open-file-description locks are not available on {}", platform.os))
                .remedy("Set `use_ofdlocks` to off or auto")]
        } else {
            vec![]
        }
    }
}

pub struct InstrumentationRule;

impl ConstraintRule for InstrumentationRule {
    fn name(&self) -> &'static str { "instrumentation" }

    fn check(&self, requests: &FeatureRequests, platform: &Platform) -> Vec<ConfigViolation> {
        let mut violations = vec![];

        if requests.valgrind == Request::Explicit(true) && platform.is_windows() {
            violations.push(
                ConfigViolation::new(self.name(), ToggleKey::Valgrind, requests, platform)
                    .message("Valgrind hooks are not available on Windows")
                    .remedy("Set `valgrind` to off"),
            );
        }

        if requests.asan == Request::Explicit(true) && requests.valgrind == Request::Explicit(true) {
            violations.push(
                ConfigViolation::new(self.name(), ToggleKey::Asan, requests, platform)
                    .message("AddressSanitizer and Valgrind cannot instrument the same binary")
                    .remedy("Turn off either `asan` or `valgrind`"),
            );
        }

        if platform.os == OsFamily::Other {
            for key in [ToggleKey::Asan, ToggleKey::Ubsan] {
                if requests.switch(key) == Some(Request::Explicit(true)) {
                    violations.push(
                        ConfigViolation::new(self.name(), key, requests, platform)
                            .message(format!("{} needs a sanitizer runtime, which {} lacks", key, platform.os))
                            .remedy(format!("Set `{}` to off", key)),
                    );
                }
            }
        }

        if platform.msvc {
            for key in [ToggleKey::Gprof, ToggleKey::Gcov, ToggleKey::Ubsan] {
                if requests.switch(key) == Some(Request::Explicit(true)) {
                    violations.push(
                        ConfigViolation::new(self.name(), key, requests, platform)
                            .message(format!("{} instrumentation requires a GNU-compatible toolchain", key))
                            .remedy(format!("Set `{}` to off or build with a gnu target", key)),
                    );
                }
            }
        }

        violations
    }
}

/// Validator runs every rule and collects all violations.
pub struct Validator {
    rules: Vec<Box<dyn ConstraintRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(LockingSupportRule),
                Box::new(PlatformScopeRule),
                Box::new(OfdLockRule),
                Box::new(InstrumentationRule),
            ],
        }
    }

    pub fn validate(&self, requests: &FeatureRequests, platform: &Platform) -> ValidationResult {
        let mut all_violations = vec![];

        for rule in &self.rules {
            all_violations.extend(rule.check(requests, platform));
        }

        ValidationResult {
            valid: all_violations.is_empty(),
            violations: all_violations,
            target: platform.triple.clone(),
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::LockingBackend;

    #[test]
    fn auto_requests_are_valid_everywhere_with_locking() {
        let requests = FeatureRequests::default();
        for triple in ["x86_64-unknown-linux-gnu", "x86_64-pc-windows-msvc", "aarch64-apple-darwin"] {
            let result = Validator::new().validate(&requests, &Platform::from_triple(triple));
            assert!(result.valid, "{triple}: {:?}", result.violations);
        }
    }

    #[test]
    fn win32_locking_rejected_on_linux() {
        let requests = FeatureRequests {
            locking: Request::Explicit(LockingBackend::Win32Files),
            ..Default::default()
        };
        let result = Validator::new()
            .validate(&requests, &Platform::from_triple("x86_64-unknown-linux-gnu"));
        assert!(!result.valid);
        assert_eq!(result.violations[0].rule, "locking_support");
        assert_eq!(result.violations[0].requested, "win32files");
    }

    #[test]
    fn all_violations_are_collected() {
        let requests = FeatureRequests {
            locking: Request::Explicit(LockingBackend::SystemV),
            valgrind: Request::Explicit(true),
            gcov: Request::Explicit(true),
            osx_speed_insteadof_durability: Request::Explicit(true),
            ..Default::default()
        };
        let result = Validator::new()
            .validate(&requests, &Platform::from_triple("x86_64-pc-windows-msvc"));
        let toggles: Vec<_> = result.violations.iter().map(|v| v.toggle).collect();
        assert_eq!(
            toggles,
            vec![
                ToggleKey::Locking,
                ToggleKey::OsxSpeedInsteadofDurability,
                ToggleKey::Valgrind,
                ToggleKey::Gcov,
            ]
        );
    }

    #[test]
    fn sanitizers_checked_against_toolchain() {
        let requests = FeatureRequests {
            asan: Request::Explicit(true),
            ubsan: Request::Explicit(true),
            ..Default::default()
        };
        let msvc = Validator::new()
            .validate(&requests, &Platform::from_triple("x86_64-pc-windows-msvc"));
        let toggles: Vec<_> = msvc.violations.iter().map(|v| v.toggle).collect();
        assert_eq!(toggles, vec![ToggleKey::Ubsan]);

        let linux = Validator::new()
            .validate(&requests, &Platform::from_triple("x86_64-unknown-linux-gnu"));
        assert!(linux.valid);

        let bare = Validator::new()
            .validate(&requests, &Platform::from_triple("thumbv7em-none-eabihf"));
        let toggles: Vec<_> = bare.violations.iter().map(|v| v.toggle).collect();
        assert!(toggles.contains(&ToggleKey::Asan));
        assert!(toggles.contains(&ToggleKey::Ubsan));
    }

    #[test]
    fn asan_conflicts_with_valgrind() {
        let requests = FeatureRequests {
            asan: Request::Explicit(true),
            valgrind: Request::Explicit(true),
            ..Default::default()
        };
        let result = Validator::new()
            .validate(&requests, &Platform::from_triple("x86_64-unknown-linux-gnu"));
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].rule, "instrumentation");
        assert_eq!(result.violations[0].toggle, ToggleKey::Asan);
    }

    #[test]
    fn explicit_off_never_violates() {
        let requests = FeatureRequests {
            without_msvc_crt: Request::Explicit(false),
            use_ofdlocks: Request::Explicit(false),
            ..Default::default()
        };
        let result = Validator::new()
            .validate(&requests, &Platform::from_triple("aarch64-apple-darwin"));
        assert!(result.valid);
    }
}
