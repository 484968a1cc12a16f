//! Provenance Pipeline - Single Entry Point
//!
//! CRITICAL: `run` always resolves the configuration before finalizing the
//! version, and always runs the guard before rendering. No bypass.

use serde::Serialize;
use std::path::Path;
use thiserror::Error;

use crate::codegen::{self, GeneratedArtifacts};
use crate::emitter::{self, BuildConfig, ConfigError};
use crate::facts::{FactBundle, FactError};
use crate::version::{ApiContract, FinalizedVersion, UnresolvedVersion, VersionSkew};

#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error(transparent)]
    Facts(#[from] FactError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    VersionSkew(#[from] VersionSkew),

    #[error("Failed to write artifacts: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything one build produces.
#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    pub config: BuildConfig,
    pub version: FinalizedVersion,
    pub artifacts: GeneratedArtifacts,
}

impl Provenance {
    pub fn write_to(&self, dir: &Path) -> Result<(), ProvenanceError> {
        self.artifacts.write_to(dir)?;
        Ok(())
    }
}

pub struct ProvenancePipeline {
    api: ApiContract,
}

impl ProvenancePipeline {
    pub fn new(api: ApiContract) -> Self {
        Self { api }
    }

    /// Configuration only: validate facts, resolve toggles, fingerprint.
    pub fn resolve(&self, facts: &FactBundle) -> Result<BuildConfig, ProvenanceError> {
        facts.validate()?;
        Ok(emitter::emit(facts)?)
    }

    /// Configuration plus guard, without rendering.
    pub fn finalize(&self, facts: &FactBundle) -> Result<(BuildConfig, FinalizedVersion), ProvenanceError> {
        let config = self.resolve(facts)?;
        let version = UnresolvedVersion::new(facts, &config).finalize(self.api)?;
        Ok((config, version))
    }

    /// The full build step. On any error nothing is rendered.
    pub fn run(&self, facts: &FactBundle) -> Result<Provenance, ProvenanceError> {
        let (config, version) = self.finalize(facts)?;
        let artifacts = codegen::render(&config, &version);
        Ok(Provenance {
            config,
            version,
            artifacts,
        })
    }
}
