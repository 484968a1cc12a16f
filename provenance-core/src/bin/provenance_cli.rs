//! Provenance CLI - Packaging-step interface
//!
//! Commands: platform, resolve, check, stamp
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on a configuration contradiction or version skew

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use provenance_core::{
    facts, init_tracing, ApiContract, FactBundle, Platform, ProvenanceError, ProvenancePipeline,
};

#[derive(Parser)]
#[command(name = "provenance-cli")]
#[command(about = "Provenance CLI - build configuration and version identity")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Also apply PROVENANCE_* environment overrides to the fact file
    #[arg(long, global = true)]
    env_overrides: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe what a target triple supports
    Platform {
        #[arg(short, long)]
        target: String,
    },

    /// Resolve the build configuration from a fact file
    Resolve {
        /// Fact file (JSON or TOML)
        #[arg(short, long)]
        facts: PathBuf,
    },

    /// Run the API version guard
    Check {
        #[arg(short, long)]
        facts: PathBuf,

        /// Interface-declared version, e.g. 0.11
        #[arg(short, long)]
        api: ApiContract,
    },

    /// Generate the build artifacts into a directory
    Stamp {
        #[arg(short, long)]
        facts: PathBuf,

        #[arg(short, long)]
        api: ApiContract,

        #[arg(short, long)]
        out_dir: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to serialize output: {}", e),
    }
}

fn fail(error: &ProvenanceError) -> ExitCode {
    let output = serde_json::json!({
        "success": false,
        "error": error.to_string(),
    });
    println!("{}", output);
    match error {
        ProvenanceError::Config(_) | ProvenanceError::VersionSkew(_) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

fn load_facts(path: &Path, env_overrides: bool) -> Result<FactBundle, ProvenanceError> {
    let facts = if env_overrides {
        facts::load(&facts::from_file(path)?, None)?
    } else {
        facts::from_file(path)?
    };
    Ok(facts)
}

fn main() -> ExitCode {
    init_tracing("warn");
    let cli = Cli::parse();

    match cli.command {
        Commands::Platform { target } => {
            print_json(&Platform::from_triple(&target).capabilities());
            ExitCode::SUCCESS
        }

        Commands::Resolve { facts } => {
            // The guard is not consulted here, so any contract will do.
            let pipeline = ProvenancePipeline::new(ApiContract::new(0, 0));
            match load_facts(&facts, cli.env_overrides).and_then(|f| pipeline.resolve(&f)) {
                Ok(config) => {
                    print_json(&config);
                    ExitCode::SUCCESS
                }
                Err(e) => fail(&e),
            }
        }

        Commands::Check { facts, api } => {
            let pipeline = ProvenancePipeline::new(api);
            match load_facts(&facts, cli.env_overrides).and_then(|f| pipeline.finalize(&f)) {
                Ok((_, version)) => {
                    print_json(&serde_json::json!({
                        "success": true,
                        "api": version.api().to_string(),
                        "version": version.record(),
                    }));
                    ExitCode::SUCCESS
                }
                Err(e) => fail(&e),
            }
        }

        Commands::Stamp { facts, api, out_dir } => {
            let pipeline = ProvenancePipeline::new(api);
            let result = load_facts(&facts, cli.env_overrides)
                .and_then(|f| pipeline.run(&f))
                .and_then(|p| p.write_to(&out_dir).map(|_| p));
            match result {
                Ok(provenance) => {
                    print_json(&serde_json::json!({
                        "success": true,
                        "out_dir": out_dir,
                        "sourcery": provenance.version.sourcery(),
                        "options": provenance.config.descriptors.options,
                    }));
                    ExitCode::SUCCESS
                }
                Err(e) => fail(&e),
            }
        }
    }
}
