//! Stamps the host library with its build configuration and version
//! identity. Fails the build on a contradictory configuration or an API
//! version skew, before anything is written.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use provenance_core::{codegen, detect, facts, ApiContract, Platform, ProvenancePipeline};

mod api {
    include!("src/api.rs");
}

fn main() -> Result<()> {
    println!("cargo::rerun-if-changed=src");
    println!("cargo::rerun-if-env-changed=SOURCE_DATE_EPOCH");
    for var in codegen::watched_env_vars(facts::ENV_PREFIX) {
        println!("cargo::rerun-if-env-changed={}", var);
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);

    // A new commit or tag changes the VCS facts without touching `src`.
    for path in detect::vcs_watch_paths(&manifest_dir) {
        println!("cargo::rerun-if-changed={}", path.display());
    }

    let detected = detect::detect(&manifest_dir, |key| env::var(key).ok())
        .context("failed to detect build facts")?;

    let fact_file = env::var_os("PROVENANCE_FACTS").map(PathBuf::from);
    if let Some(path) = &fact_file {
        println!("cargo::rerun-if-changed={}", path.display());
        println!("cargo::warning=using packaged facts from {}", path.display());
    }
    let facts = facts::load(&detected, fact_file.as_deref()).context("failed to load build facts")?;

    let api = ApiContract::new(api::API_VERSION_MAJOR, api::API_VERSION_MINOR);
    let provenance = ProvenancePipeline::new(api).run(&facts)?;
    provenance.write_to(&out_dir)?;

    for directive in &provenance.artifacts.directives {
        println!("{}", directive);
    }
    let host = Platform::from_triple(&env::var("TARGET")?);
    for directive in codegen::link_directives(&host) {
        println!("{}", directive);
    }

    Ok(())
}
