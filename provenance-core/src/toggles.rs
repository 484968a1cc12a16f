//! Toggle System - Feature Requests and Their Resolved Values
//!
//! A request is either `auto` or an explicit value. A resolved toggle set
//! has no way to represent `auto` at all.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::platform::LockingBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleKey {
    ForceAssertions,
    Valgrind,
    Gprof,
    Gcov,
    Asan,
    Ubsan,
    EnvCheckpid,
    Locking,
    TrustRtc,
    DisablePagechecks,
    WithoutMsvcCrt,
    OsxSpeedInsteadofDurability,
    DisableGnuSource,
    UseOfdlocks,
    TxnCheckowner,
    Lto,
}

impl ToggleKey {
    pub const ALL: [ToggleKey; 16] = [
        Self::ForceAssertions,
        Self::Valgrind,
        Self::Gprof,
        Self::Gcov,
        Self::Asan,
        Self::Ubsan,
        Self::EnvCheckpid,
        Self::Locking,
        Self::TrustRtc,
        Self::DisablePagechecks,
        Self::WithoutMsvcCrt,
        Self::OsxSpeedInsteadofDurability,
        Self::DisableGnuSource,
        Self::UseOfdlocks,
        Self::TxnCheckowner,
        Self::Lto,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ForceAssertions => "force_assertions",
            Self::Valgrind => "valgrind",
            Self::Gprof => "gprof",
            Self::Gcov => "gcov",
            Self::Asan => "asan",
            Self::Ubsan => "ubsan",
            Self::EnvCheckpid => "env_checkpid",
            Self::Locking => "locking",
            Self::TrustRtc => "trust_rtc",
            Self::DisablePagechecks => "disable_pagechecks",
            Self::WithoutMsvcCrt => "without_msvc_crt",
            Self::OsxSpeedInsteadofDurability => "osx_speed_insteadof_durability",
            Self::DisableGnuSource => "disable_gnu_source",
            Self::UseOfdlocks => "use_ofdlocks",
            Self::TxnCheckowner => "txn_checkowner",
            Self::Lto => "lto",
        }
    }

    /// Name of the generated constant, e.g. `USE_OFDLOCKS`.
    pub fn const_name(&self) -> String {
        self.as_str().to_ascii_uppercase()
    }

    /// Name of the cargo cfg emitted for this toggle, e.g. `provenance_lto`.
    pub fn cfg_name(&self) -> String {
        format!("provenance_{}", self.as_str())
    }
}

impl fmt::Display for ToggleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value that can be requested explicitly for a toggle.
pub trait RequestValue: Copy + Sized {
    fn parse_request(s: &str) -> Option<Self>;
    fn render(&self) -> &'static str;
}

impl RequestValue for bool {
    fn parse_request(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "1" | "true" | "yes" => Some(true),
            "off" | "0" | "false" | "no" => Some(false),
            _ => None,
        }
    }

    fn render(&self) -> &'static str {
        if *self { "on" } else { "off" }
    }
}

impl RequestValue for LockingBackend {
    fn parse_request(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    fn render(&self) -> &'static str {
        self.as_str()
    }
}

/// A feature request: resolved by platform policy, or pinned by the packager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<T> {
    Auto,
    Explicit(T),
}

impl<T> Default for Request<T> {
    fn default() -> Self {
        Self::Auto
    }
}

impl<T: RequestValue> Request<T> {
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }

    pub fn explicit(&self) -> Option<T> {
        match self {
            Self::Auto => None,
            Self::Explicit(v) => Some(*v),
        }
    }

    pub fn resolve_or(&self, auto: T) -> T {
        self.explicit().unwrap_or(auto)
    }

    pub fn render(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Explicit(v) => v.render(),
        }
    }
}

impl<T: RequestValue> FromStr for Request<T> {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        T::parse_request(s)
            .map(Self::Explicit)
            .ok_or_else(|| format!("unrecognized feature request `{s}`"))
    }
}

impl<T: RequestValue> fmt::Display for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.render())
    }
}

impl<T: RequestValue> Serialize for Request<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.render())
    }
}

// JSON and TOML fact files may spell requests as `true` or `1` rather than
// strings.
struct RequestVisitor<T>(PhantomData<T>);

impl<'de, T: RequestValue> Visitor<'de> for RequestVisitor<T> {
    type Value = Request<T>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("`auto`, `on`, `off`, or a backend name")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        self.visit_str(if v { "on" } else { "off" })
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        self.visit_str(&v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        self.visit_str(&v.to_string())
    }
}

impl<'de, T: RequestValue> Deserialize<'de> for Request<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RequestVisitor(PhantomData))
    }
}

/// Every toggle a packager may request. Unnamed toggles default to `auto`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureRequests {
    pub force_assertions: Request<bool>,
    pub valgrind: Request<bool>,
    pub gprof: Request<bool>,
    pub gcov: Request<bool>,
    pub asan: Request<bool>,
    pub ubsan: Request<bool>,
    pub env_checkpid: Request<bool>,
    pub locking: Request<LockingBackend>,
    pub trust_rtc: Request<bool>,
    pub disable_pagechecks: Request<bool>,
    pub without_msvc_crt: Request<bool>,
    pub osx_speed_insteadof_durability: Request<bool>,
    pub disable_gnu_source: Request<bool>,
    pub use_ofdlocks: Request<bool>,
    pub txn_checkowner: Request<bool>,
    pub lto: Request<bool>,
}

impl FeatureRequests {
    /// The switch request for a boolean toggle; `None` for `locking`.
    pub fn switch(&self, key: ToggleKey) -> Option<Request<bool>> {
        let req = match key {
            ToggleKey::ForceAssertions => self.force_assertions,
            ToggleKey::Valgrind => self.valgrind,
            ToggleKey::Gprof => self.gprof,
            ToggleKey::Gcov => self.gcov,
            ToggleKey::Asan => self.asan,
            ToggleKey::Ubsan => self.ubsan,
            ToggleKey::EnvCheckpid => self.env_checkpid,
            ToggleKey::Locking => return None,
            ToggleKey::TrustRtc => self.trust_rtc,
            ToggleKey::DisablePagechecks => self.disable_pagechecks,
            ToggleKey::WithoutMsvcCrt => self.without_msvc_crt,
            ToggleKey::OsxSpeedInsteadofDurability => self.osx_speed_insteadof_durability,
            ToggleKey::DisableGnuSource => self.disable_gnu_source,
            ToggleKey::UseOfdlocks => self.use_ofdlocks,
            ToggleKey::TxnCheckowner => self.txn_checkowner,
            ToggleKey::Lto => self.lto,
        };
        Some(req)
    }

    pub fn rendered(&self, key: ToggleKey) -> &'static str {
        match self.switch(key) {
            Some(req) => req.render(),
            None => self.locking.render(),
        }
    }

    /// Toggles the packager pinned explicitly.
    pub fn explicit_keys(&self) -> Vec<ToggleKey> {
        ToggleKey::ALL
            .into_iter()
            .filter(|key| match self.switch(*key) {
                Some(req) => !req.is_auto(),
                None => !self.locking.is_auto(),
            })
            .collect()
    }
}

/// A concrete toggle value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToggleValue {
    Switch(bool),
    Locking(LockingBackend),
}

impl fmt::Display for ToggleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Switch(on) => f.write_str(if *on { "1" } else { "0" }),
            Self::Locking(backend) => f.write_str(backend.as_str()),
        }
    }
}

/// Fully resolved toggles. Produced only by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedToggles {
    pub force_assertions: bool,
    pub valgrind: bool,
    pub gprof: bool,
    pub gcov: bool,
    pub asan: bool,
    pub ubsan: bool,
    pub env_checkpid: bool,
    pub locking: LockingBackend,
    pub trust_rtc: bool,
    pub disable_pagechecks: bool,
    pub without_msvc_crt: bool,
    pub osx_speed_insteadof_durability: bool,
    pub disable_gnu_source: bool,
    pub use_ofdlocks: bool,
    pub txn_checkowner: bool,
    pub lto: bool,
}

impl ResolvedToggles {
    pub fn get(&self, key: ToggleKey) -> ToggleValue {
        let on = match key {
            ToggleKey::ForceAssertions => self.force_assertions,
            ToggleKey::Valgrind => self.valgrind,
            ToggleKey::Gprof => self.gprof,
            ToggleKey::Gcov => self.gcov,
            ToggleKey::Asan => self.asan,
            ToggleKey::Ubsan => self.ubsan,
            ToggleKey::EnvCheckpid => self.env_checkpid,
            ToggleKey::Locking => return ToggleValue::Locking(self.locking),
            ToggleKey::TrustRtc => self.trust_rtc,
            ToggleKey::DisablePagechecks => self.disable_pagechecks,
            ToggleKey::WithoutMsvcCrt => self.without_msvc_crt,
            ToggleKey::OsxSpeedInsteadofDurability => self.osx_speed_insteadof_durability,
            ToggleKey::DisableGnuSource => self.disable_gnu_source,
            ToggleKey::UseOfdlocks => self.use_ofdlocks,
            ToggleKey::TxnCheckowner => self.txn_checkowner,
            ToggleKey::Lto => self.lto,
        };
        ToggleValue::Switch(on)
    }

    pub fn entries(&self) -> Vec<(ToggleKey, ToggleValue)> {
        ToggleKey::ALL.into_iter().map(|k| (k, self.get(k))).collect()
    }

    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        self.entries()
            .into_iter()
            .map(|(k, v)| (k.as_str(), v.to_string()))
            .collect()
    }

    /// Stable `key=value` listing in declaration order.
    pub fn options_string(&self) -> String {
        self.entries()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
