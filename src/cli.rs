use clap::{Parser, Subcommand};
use pkgforge::digest::HashAlgorithm;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pkgforge")]
#[command(about = "Acquire, build and fingerprint source packages", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Acquire, build and hash every package in a manifest
    Build(BuildArgs),
    /// Print the digest of a file
    Hash(HashArgs),
    /// Validate a manifest and show which handler each package would use
    Check(CheckArgs),
}

#[derive(clap::Args, Debug)]
pub struct BuildArgs {
    /// Manifest with `[[packages]]` entries
    #[arg(long, short)]
    pub manifest: PathBuf,

    /// Configuration file (defaults to $PKGFORGE_CONFIG or config/pkgforge.toml)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Only build the named packages (repeatable)
    #[arg(long = "only", value_name = "NAME")]
    pub only: Vec<String>,

    /// Maximum packages in flight (overrides orchestrator.max_concurrent)
    #[arg(long, short)]
    pub jobs: Option<usize>,

    /// Write the per-package reports as JSON
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Record the commands that would run without spawning anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct HashArgs {
    pub path: PathBuf,

    /// sha256, sha1 or md5
    #[arg(long, short, default_value = "sha256")]
    pub algorithm: HashAlgorithm,
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    #[arg(long, short)]
    pub manifest: PathBuf,

    #[arg(long, short)]
    pub config: Option<PathBuf>,
}
