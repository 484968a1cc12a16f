//! Platform Capabilities - What a Target Can Do
//!
//! Everything here is derived from the target triple alone, so the same
//! triple always yields the same capability descriptor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Android,
    MacOs,
    Ios,
    FreeBsd,
    NetBsd,
    OpenBsd,
    Illumos,
    Windows,
    OtherUnix,
    Other,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Android => "android",
            Self::MacOs => "darwin",
            Self::Ios => "ios",
            Self::FreeBsd => "freebsd",
            Self::NetBsd => "netbsd",
            Self::OpenBsd => "openbsd",
            Self::Illumos => "illumos",
            Self::Windows => "windows",
            Self::OtherUnix => "unix",
            Self::Other => "other",
        }
    }

    fn from_components(components: &[&str]) -> Self {
        let has = |name: &str| components.iter().any(|c| *c == name);
        let has_prefix = |prefix: &str| components.iter().any(|c| c.starts_with(prefix));

        // Order matters: android triples also name linux.
        if has("windows") || has("win32") || has("win64") || has_prefix("mingw") {
            Self::Windows
        } else if has("android") || has_prefix("androideabi") {
            Self::Android
        } else if has("linux") {
            Self::Linux
        } else if has("darwin") || has("macos") || has("macosx") {
            Self::MacOs
        } else if has("ios") || has("tvos") || has("watchos") || has("visionos") {
            Self::Ios
        } else if has_prefix("freebsd") {
            Self::FreeBsd
        } else if has_prefix("netbsd") {
            Self::NetBsd
        } else if has_prefix("openbsd") {
            Self::OpenBsd
        } else if has("illumos") || has("solaris") || has_prefix("sunos") {
            Self::Illumos
        } else if has_prefix("dragonfly")
            || has("haiku")
            || has("hurd")
            || has("aix")
            || has("redox")
            || has("cygwin")
        {
            Self::OtherUnix
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inter-process locking family used by the host library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LockingBackend {
    #[serde(rename = "win32files")]
    Win32Files,
    #[serde(rename = "sysv")]
    SystemV,
    #[serde(rename = "posix1988")]
    Posix1988,
    #[serde(rename = "posix2001")]
    Posix2001,
    #[serde(rename = "posix2008")]
    Posix2008,
}

impl LockingBackend {
    pub const ALL: [LockingBackend; 5] = [
        Self::Win32Files,
        Self::SystemV,
        Self::Posix1988,
        Self::Posix2001,
        Self::Posix2008,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Win32Files => "win32files",
            Self::SystemV => "sysv",
            Self::Posix1988 => "posix1988",
            Self::Posix2001 => "posix2001",
            Self::Posix2008 => "posix2008",
        }
    }
}

impl fmt::Display for LockingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown locking backend: {0}")]
pub struct UnknownLockingBackend(pub String);

impl FromStr for LockingBackend {
    type Err = UnknownLockingBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|b| b.as_str() == lower)
            .ok_or_else(|| UnknownLockingBackend(s.to_string()))
    }
}

const WINDOWS_LOCKING: &[LockingBackend] = &[LockingBackend::Win32Files];
const ROBUST_POSIX_LOCKING: &[LockingBackend] = &[
    LockingBackend::SystemV,
    LockingBackend::Posix1988,
    LockingBackend::Posix2001,
    LockingBackend::Posix2008,
];
const ANDROID_LOCKING: &[LockingBackend] = &[
    LockingBackend::Posix1988,
    LockingBackend::Posix2001,
    LockingBackend::Posix2008,
];
const PLAIN_POSIX_LOCKING: &[LockingBackend] = &[
    LockingBackend::SystemV,
    LockingBackend::Posix1988,
    LockingBackend::Posix2001,
];

/// A build target and the capabilities the toggle resolver relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub triple: String,
    pub os: OsFamily,
    pub msvc: bool,
}

impl Platform {
    /// Accepts Rust triples (`x86_64-unknown-linux-gnu`) as well as
    /// CMake-style system names (`x86_64-Darwin`).
    pub fn from_triple(triple: &str) -> Self {
        let lower = triple.trim().to_ascii_lowercase();
        let components: Vec<&str> = lower.split('-').collect();
        let os = OsFamily::from_components(&components);
        let msvc = os == OsFamily::Windows && components.iter().any(|c| *c == "msvc");
        Self {
            triple: triple.trim().to_string(),
            os,
            msvc,
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os == OsFamily::Windows
    }

    pub fn is_apple(&self) -> bool {
        matches!(self.os, OsFamily::MacOs | OsFamily::Ios)
    }

    pub fn is_unix(&self) -> bool {
        !matches!(self.os, OsFamily::Windows | OsFamily::Other)
    }

    pub fn locking_families(&self) -> &'static [LockingBackend] {
        match self.os {
            OsFamily::Windows => WINDOWS_LOCKING,
            OsFamily::Linux | OsFamily::FreeBsd | OsFamily::NetBsd | OsFamily::Illumos => {
                ROBUST_POSIX_LOCKING
            }
            OsFamily::Android => ANDROID_LOCKING,
            OsFamily::MacOs | OsFamily::Ios | OsFamily::OpenBsd | OsFamily::OtherUnix => {
                PLAIN_POSIX_LOCKING
            }
            OsFamily::Other => &[],
        }
    }

    pub fn supports_locking(&self, backend: LockingBackend) -> bool {
        self.locking_families().contains(&backend)
    }

    /// The family `auto` resolves to. `None` when the target has no
    /// inter-process locking at all.
    pub fn native_locking(&self) -> Option<LockingBackend> {
        match self.os {
            OsFamily::Windows => Some(LockingBackend::Win32Files),
            OsFamily::MacOs | OsFamily::Ios | OsFamily::OpenBsd => Some(LockingBackend::SystemV),
            OsFamily::Linux
            | OsFamily::Android
            | OsFamily::FreeBsd
            | OsFamily::NetBsd
            | OsFamily::Illumos => Some(LockingBackend::Posix2008),
            OsFamily::OtherUnix => Some(LockingBackend::Posix2001),
            OsFamily::Other => None,
        }
    }

    pub fn monotonic_clock_reliable(&self) -> bool {
        matches!(
            self.os,
            OsFamily::Linux
                | OsFamily::Android
                | OsFamily::MacOs
                | OsFamily::Ios
                | OsFamily::FreeBsd
                | OsFamily::Windows
        )
    }

    /// Open-file-description locks (`F_OFD_SETLK`).
    pub fn has_ofd_locks(&self) -> bool {
        matches!(self.os, OsFamily::Linux | OsFamily::Android)
    }

    /// Whether mapped regions can be excluded from `fork` children
    /// (`MADV_DONTFORK`), which makes a pid check unnecessary.
    pub fn can_exclude_from_fork(&self) -> bool {
        matches!(self.os, OsFamily::Linux | OsFamily::Android)
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            triple: self.triple.clone(),
            os: self.os,
            msvc: self.msvc,
            unix: self.is_unix(),
            locking_families: self.locking_families().to_vec(),
            native_locking: self.native_locking(),
            monotonic_clock_reliable: self.monotonic_clock_reliable(),
            ofd_locks: self.has_ofd_locks(),
            fork_exclusion: self.can_exclude_from_fork(),
        }
    }
}

/// Serializable view of everything [`Platform`] knows about a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub triple: String,
    pub os: OsFamily,
    pub msvc: bool,
    pub unix: bool,
    pub locking_families: Vec<LockingBackend>,
    pub native_locking: Option<LockingBackend>,
    pub monotonic_clock_reliable: bool,
    pub ofd_locks: bool,
    pub fork_exclusion: bool,
}
