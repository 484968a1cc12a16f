//! Hashing System - SHA-256 Fingerprints
//!
//! Provides deterministic, reproducible fingerprints binding a binary to the
//! exact source and configuration that produced it.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

use crate::facts::{SemVer, VcsInfo};
use crate::toggles::ResolvedToggles;

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: String,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let sorted_map: serde_json::Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            Value::Object(sorted_map)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Deterministic digest of a directory tree: relative paths and file
/// contents, sorted by path. Metadata is ignored.
pub fn digest_tree(root: &Path) -> Result<String, DigestError> {
    let mut entries: Vec<(String, String)> = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| DigestError::Walk {
            path: root.display().to_string(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel_path = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let content = fs::read(entry.path()).map_err(|source| DigestError::Read {
            path: entry.path().display().to_string(),
            source,
        })?;
        entries.push((rel_path, sha256_hex(&content)));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (path, hash) in &entries {
        hasher.update(path.as_bytes());
        hasher.update(b":");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}

/// What a derived fingerprint covers. The timestamp is not an input, so
/// rebuilding the same source with the same options yields the same value.
#[derive(Debug, Serialize)]
pub struct FingerprintInputs<'a> {
    pub source_digest: &'a str,
    pub options: BTreeMap<&'static str, String>,
    pub target: &'a str,
    pub build_type: &'a str,
    pub compiler: &'a str,
    pub flags: &'a str,
}

impl<'a> FingerprintInputs<'a> {
    pub fn new(
        source_digest: &'a str,
        toggles: &ResolvedToggles,
        target: &'a str,
        build_type: &'a str,
        compiler: &'a str,
        flags: &'a str,
    ) -> Self {
        Self {
            source_digest,
            options: toggles.to_map(),
            target,
            build_type,
            compiler,
            flags,
        }
    }
}

/// fingerprint = sha256(canonical inputs) + `_v<major>_<minor>_<patch>_<revision>_g<commit7>`
pub fn derive_fingerprint(
    inputs: &FingerprintInputs<'_>,
    version: &SemVer,
    vcs: &VcsInfo,
) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(inputs)?;
    let mut fingerprint = format!(
        "{}_v{}_{}_{}_{}",
        sha256_hex(canonical.as_bytes()),
        version.major,
        version.minor,
        version.patch,
        version.revision
    );
    let short = vcs.short_commit();
    if !short.is_empty() {
        fingerprint.push_str("_g");
        fingerprint.push_str(short);
    }
    Ok(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": 2, "m": 3});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_tree_tracks_content_not_mtime() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        fs::write(dir.path().join("nested/b.rs"), "fn b() {}").unwrap();

        let h1 = digest_tree(dir.path()).unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        let h2 = digest_tree(dir.path()).unwrap();
        assert_eq!(h1, h2);

        fs::write(dir.path().join("nested/b.rs"), "fn b() { todo!() }").unwrap();
        let h3 = digest_tree(dir.path()).unwrap();
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_digest_tree_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(digest_tree(&missing), Err(DigestError::Walk { .. })));
    }
}
