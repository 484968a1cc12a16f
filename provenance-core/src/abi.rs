//! Exported record layout.
//!
//! These types are `#[repr(C)]` so provenance tooling can read the exported
//! statics by symbol name without linking against Rust.

use std::ffi::{c_char, CStr};
use std::fmt;

use crate::facts::SemVer;

/// Pointer to a NUL-terminated string with `'static` storage.
#[repr(transparent)]
#[derive(Clone, Copy)]
pub struct RawStr(*const c_char);

// SAFETY: a RawStr can only be built from a `&'static CStr`, which is
// immutable and lives for the whole program.
unsafe impl Sync for RawStr {}
unsafe impl Send for RawStr {}

impl RawStr {
    pub const fn new(s: &'static CStr) -> Self {
        Self(s.as_ptr())
    }

    pub fn as_c_str(&self) -> &'static CStr {
        // SAFETY: see `new`.
        unsafe { CStr::from_ptr(self.0) }
    }

    /// Generated strings are always UTF-8; anything else reads as empty.
    pub fn as_str(&self) -> &'static str {
        self.as_c_str().to_str().unwrap_or_default()
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.0
    }
}

impl fmt::Debug for RawStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for RawStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for RawStr {
    fn eq(&self, other: &Self) -> bool {
        self.as_c_str() == other.as_c_str()
    }
}

impl Eq for RawStr {}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitInfo {
    pub datetime: RawStr,
    pub commit: RawStr,
    pub root: RawStr,
    pub describe: RawStr,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub major: u8,
    pub minor: u8,
    pub release: u16,
    pub revision: u32,
    pub git: GitInfo,
    pub sourcery: RawStr,
}

impl VersionInfo {
    pub fn semver(&self) -> SemVer {
        SemVer::new(self.major, self.minor, self.release, self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SAMPLE: VersionInfo = VersionInfo {
        major: 0,
        minor: 11,
        release: 1,
        revision: 2,
        git: GitInfo {
            datetime: RawStr::new(c"2021-10-24T20:43:37+03:00"),
            commit: RawStr::new(c"710fc95d9a3fd58e37449f3f7237195546542a75"),
            root: RawStr::new(c"f33a083671172dd0507eef4ee009803e729a3ce3"),
            describe: RawStr::new(c"v0.11.1-2-g710fc95"),
        },
        sourcery: RawStr::new(c"abc123"),
    };

    #[test]
    fn reads_back_static_strings() {
        assert_eq!(SAMPLE.semver(), SemVer::new(0, 11, 1, 2));
        assert_eq!(SAMPLE.git.describe.as_str(), "v0.11.1-2-g710fc95");
        assert_eq!(SAMPLE.sourcery.to_string(), "abc123");
    }

    #[test]
    fn equality_compares_contents() {
        assert_eq!(RawStr::new(c"abc123"), SAMPLE.sourcery);
        assert_ne!(RawStr::new(c"abc124"), SAMPLE.sourcery);
    }
}
