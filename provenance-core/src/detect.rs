//! Detect build facts from a Cargo build-script environment.
//!
//! Nothing here fails on a missing VCS or compiler; those facts are simply
//! left empty. Only the source digest and an oversized package version fail.

use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::facts::{FactBundle, SemVer, VcsInfo};
use crate::hashing::{digest_tree, DigestError};
use crate::toggles::FeatureRequests;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error("Package version {version}: {field} exceeds {max}")]
    VersionOutOfRange {
        version: String,
        field: &'static str,
        max: u64,
    },
}

/// Gather facts for the crate at `manifest_dir`. `env` looks up build-script
/// environment variables (`TARGET`, `PROFILE`, `CARGO_PKG_VERSION`, ...).
pub fn detect<F>(manifest_dir: &Path, env: F) -> Result<FactBundle, DetectError>
where
    F: Fn(&str) -> Option<String>,
{
    let package = env("CARGO_PKG_VERSION")
        .and_then(|v| semver::Version::parse(&v).ok())
        .unwrap_or_else(|| semver::Version::new(0, 0, 0));
    let git = git_info(manifest_dir);
    let version = semver_from(&package, &git.describe)?;

    let source_dir = manifest_dir.join("src");
    let source_digest = if source_dir.is_dir() {
        digest_tree(&source_dir)?
    } else {
        String::new()
    };

    let facts = FactBundle {
        timestamp: timestamp(env("SOURCE_DATE_EPOCH").as_deref()),
        target: env("TARGET").unwrap_or_else(|| "unknown".to_string()),
        build_type: build_type_label(
            env("PROFILE").as_deref(),
            env("OPT_LEVEL").as_deref(),
            env("DEBUG").as_deref(),
        )
        .to_string(),
        compiler: compiler_identity(env("RUSTC").as_deref().unwrap_or("rustc")),
        flags: flags(&env),
        version,
        git,
        fingerprint: None,
        source_digest,
        features: FeatureRequests::default(),
    };
    tracing::debug!(triple = %facts.target, version = %facts.version, "facts detected");
    Ok(facts)
}

/// `SOURCE_DATE_EPOCH` wins for reproducible builds; otherwise now.
pub fn timestamp(source_date_epoch: Option<&str>) -> String {
    let pinned = source_date_epoch
        .and_then(|s| s.trim().parse::<i64>().ok())
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0));
    pinned
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Map a cargo profile onto the CMake-style build type labels.
pub fn build_type_label(profile: Option<&str>, opt_level: Option<&str>, debug: Option<&str>) -> &'static str {
    if profile != Some("release") {
        return "Debug";
    }
    match (opt_level, debug) {
        (Some("s") | Some("z"), _) => "MinSizeRel",
        (_, Some(d)) if !matches!(d, "false" | "0" | "none") => "RelWithDebInfo",
        _ => "Release",
    }
}

fn flags<F>(env: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut flags = vec![];
    if let Some(level) = env("OPT_LEVEL") {
        flags.push(format!("opt-level={}", level));
    }
    if let Some(debug) = env("DEBUG") {
        flags.push(format!("debuginfo={}", debug));
    }
    if let Some(encoded) = env("CARGO_ENCODED_RUSTFLAGS") {
        flags.extend(
            encoded
                .split('\x1f')
                .filter(|f| !f.is_empty())
                .map(str::to_string),
        );
    }
    flags.join(" ")
}

fn run(program: &str, args: &[&str], dir: Option<&Path>) -> Option<String> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    let output = cmd.output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn compiler_identity(rustc: &str) -> String {
    run(rustc, &["-V"], None).unwrap_or_else(|| "rustc".to_string())
}

fn git_info(dir: &Path) -> VcsInfo {
    let git = |args: &[&str]| run("git", args, Some(dir)).unwrap_or_default();
    VcsInfo {
        datetime: git(&["log", "-1", "--format=%cI"]),
        commit: git(&["rev-parse", "HEAD"]),
        root: git(&["rev-list", "--max-parents=0", "HEAD"])
            .lines()
            .last()
            .unwrap_or_default()
            .to_string(),
        describe: git(&["describe", "--tags", "--long", "--always"]),
    }
}

/// Files whose change means the VCS facts changed: `HEAD`, `refs/` and
/// `packed-refs`, resolved through `git rev-parse` so worktrees and
/// submodules work. Empty outside a repository.
pub fn vcs_watch_paths(dir: &Path) -> Vec<PathBuf> {
    let resolve = |arg: &str| run("git", &["rev-parse", arg], Some(dir)).map(|p| dir.join(p));
    let Some(git_dir) = resolve("--git-dir") else {
        return vec![];
    };
    let common_dir = resolve("--git-common-dir").unwrap_or_else(|| git_dir.clone());
    git_watch_paths(&git_dir, &common_dir)
}

/// The subset of `HEAD`, `refs` and `packed-refs` that exists. Cargo reruns
/// on every build for a missing path.
pub fn git_watch_paths(git_dir: &Path, common_dir: &Path) -> Vec<PathBuf> {
    [
        git_dir.join("HEAD"),
        common_dir.join("refs"),
        common_dir.join("packed-refs"),
    ]
    .into_iter()
    .filter(|path| path.exists())
    .collect()
}

/// Parse `v0.11.1-2-g710fc95` into the tag version and commit count.
pub fn parse_describe(describe: &str) -> Option<(semver::Version, u32)> {
    let mut parts = describe.trim().rsplitn(3, '-');
    let hash = parts.next()?;
    let count = parts.next()?.parse().ok()?;
    let tag = parts.next()?;
    if !hash.starts_with('g') {
        return None;
    }
    let version = semver::Version::parse(tag.trim_start_matches('v')).ok()?;
    Some((version, count))
}

/// The package version decides major/minor/patch. The describe string only
/// contributes a revision when its tag names the same release.
pub fn semver_from(package: &semver::Version, describe: &str) -> Result<SemVer, DetectError> {
    let revision = match parse_describe(describe) {
        Some((tag, count))
            if (tag.major, tag.minor, tag.patch) == (package.major, package.minor, package.patch) =>
        {
            count
        }
        _ => 0,
    };
    let out_of_range = |field: &'static str, max: u64| DetectError::VersionOutOfRange {
        version: package.to_string(),
        field,
        max,
    };
    Ok(SemVer::new(
        u8::try_from(package.major).map_err(|_| out_of_range("major", u8::MAX.into()))?,
        u8::try_from(package.minor).map_err(|_| out_of_range("minor", u8::MAX.into()))?,
        u16::try_from(package.patch).map_err(|_| out_of_range("patch", u16::MAX.into()))?,
        revision,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn describe_parses_tag_and_count() {
        let (version, count) = parse_describe("v0.11.1-2-g710fc95").unwrap();
        assert_eq!(version, semver::Version::new(0, 11, 1));
        assert_eq!(count, 2);
        assert!(parse_describe("710fc95").is_none());
        assert!(parse_describe("v0.11.1-x-g710fc95").is_none());
    }

    #[test]
    fn describe_with_prerelease_tag() {
        let (version, count) = parse_describe("v1.0.0-rc.1-5-gabcdef0").unwrap();
        assert_eq!(version.pre.as_str(), "rc.1");
        assert_eq!(count, 5);
    }

    #[test]
    fn revision_ignored_for_foreign_tag() {
        let package = semver::Version::new(0, 11, 1);
        assert_eq!(semver_from(&package, "v0.11.1-2-g710fc95").unwrap(), SemVer::new(0, 11, 1, 2));
        assert_eq!(semver_from(&package, "v3.0.0-7-g710fc95").unwrap(), SemVer::new(0, 11, 1, 0));
        assert_eq!(semver_from(&package, "").unwrap(), SemVer::new(0, 11, 1, 0));
    }

    #[test]
    fn oversized_package_version_is_an_error() {
        let err = semver_from(&semver::Version::new(256, 0, 0), "").unwrap_err();
        assert!(matches!(err, DetectError::VersionOutOfRange { field: "major", max: 255, .. }));
        assert!(err.to_string().contains("256.0.0"));

        let err = semver_from(&semver::Version::new(0, 11, 70000), "").unwrap_err();
        assert!(matches!(err, DetectError::VersionOutOfRange { field: "patch", .. }));
        assert!(semver_from(&semver::Version::new(255, 255, 65535), "").is_ok());
    }

    #[test]
    fn git_watch_paths_skip_missing_files() {
        let dir = tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        std::fs::create_dir_all(git_dir.join("refs/heads")).unwrap();
        std::fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").unwrap();

        let paths = git_watch_paths(&git_dir, &git_dir);
        assert_eq!(paths, vec![git_dir.join("HEAD"), git_dir.join("refs")]);

        std::fs::write(git_dir.join("packed-refs"), "").unwrap();
        assert_eq!(git_watch_paths(&git_dir, &git_dir).len(), 3);
    }

    #[test]
    fn worktree_refs_come_from_common_dir() {
        let dir = tempdir().unwrap();
        let common = dir.path().join("repo.git");
        let worktree = common.join("worktrees/feature");
        std::fs::create_dir_all(common.join("refs")).unwrap();
        std::fs::create_dir_all(&worktree).unwrap();
        std::fs::write(worktree.join("HEAD"), "").unwrap();

        let paths = git_watch_paths(&worktree, &common);
        assert_eq!(paths, vec![worktree.join("HEAD"), common.join("refs")]);
    }

    #[test]
    fn no_watch_paths_without_git_dir() {
        let dir = tempdir().unwrap();
        assert!(git_watch_paths(&dir.path().join(".git"), &dir.path().join(".git")).is_empty());
    }

    #[test]
    fn build_type_from_profile() {
        assert_eq!(build_type_label(Some("debug"), Some("0"), Some("true")), "Debug");
        assert_eq!(build_type_label(Some("release"), Some("3"), Some("false")), "Release");
        assert_eq!(build_type_label(Some("release"), Some("3"), Some("2")), "RelWithDebInfo");
        assert_eq!(build_type_label(Some("release"), Some("z"), Some("false")), "MinSizeRel");
        assert_eq!(build_type_label(None, None, None), "Debug");
    }

    #[test]
    fn source_date_epoch_pins_timestamp() {
        assert_eq!(timestamp(Some("1635378752")), "2021-10-27T23:52:32Z");
        assert!(chrono::DateTime::parse_from_rfc3339(&timestamp(None)).is_ok());
    }

    #[test]
    fn detect_reads_cargo_env() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            ("CARGO_PKG_VERSION", "0.11.1"),
            ("TARGET", "x86_64-unknown-linux-gnu"),
            ("PROFILE", "release"),
            ("OPT_LEVEL", "3"),
            ("DEBUG", "false"),
            ("SOURCE_DATE_EPOCH", "1635378752"),
            ("CARGO_ENCODED_RUSTFLAGS", "-Ctarget-cpu=native\x1f-Dwarnings"),
            ("RUSTC", "/nonexistent/rustc"),
        ]);
        let facts = detect(dir.path(), |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(facts.target, "x86_64-unknown-linux-gnu");
        assert_eq!(facts.build_type, "Release");
        assert_eq!(facts.version.major, 0);
        assert_eq!(facts.version.minor, 11);
        assert_eq!(facts.version.patch, 1);
        assert_eq!(facts.timestamp, "2021-10-27T23:52:32Z");
        assert_eq!(facts.compiler, "rustc");
        assert_eq!(facts.flags, "opt-level=3 debuginfo=false -Ctarget-cpu=native -Dwarnings");
        assert_eq!(facts.source_digest.len(), 64);
        assert!(facts.validate().is_ok());
    }
}
