use crate::acquire::DEFAULT_URL_TEMPLATE;
use crate::digest::{DEFAULT_CHUNK_SIZE, HashAlgorithm};
use crate::handlers::DEFAULT_PROBE_SOURCE;
use crate::humanize::ByteSize;
use crate::package::BuildSystem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub acquire: AcquireConfig,
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub overrides: Vec<OverrideConfig>,
}

/// Program names for the external tools, resolved on `PATH` at spawn time
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_git")]
    pub git: String,
    #[serde(default = "default_python")]
    pub python: String,
    #[serde(default = "default_make")]
    pub make: String,
    #[serde(default = "default_cmake")]
    pub cmake: String,
    #[serde(default = "default_meson")]
    pub meson: String,
    #[serde(default = "default_ninja")]
    pub ninja: String,
    #[serde(default = "default_cargo")]
    pub cargo: String,
    #[serde(default = "default_go")]
    pub go: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            git: default_git(),
            python: default_python(),
            make: default_make(),
            cmake: default_cmake(),
            meson: default_meson(),
            ninja: default_ninja(),
            cargo: default_cargo(),
            go: default_go(),
        }
    }
}

fn default_git() -> String {
    "git".to_string()
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_make() -> String {
    "make".to_string()
}

fn default_cmake() -> String {
    "cmake".to_string()
}

fn default_meson() -> String {
    "meson".to_string()
}

fn default_ninja() -> String {
    "ninja".to_string()
}

fn default_cargo() -> String {
    "cargo".to_string()
}

fn default_go() -> String {
    "go".to_string()
}

/// Source acquisition settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcquireConfig {
    #[serde(default = "default_clone_root")]
    pub clone_root: PathBuf,
    /// `--depth` passed to clones; 0 clones the full history
    #[serde(default = "default_clone_depth")]
    pub clone_depth: u32,
    /// Rendered with `{org}` and `{name}` for packages listed in
    /// `organizations`
    #[serde(default = "default_url_template")]
    pub url_template: String,
    /// Package name to hosting organization
    #[serde(default)]
    pub organizations: HashMap<String, String>,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            clone_root: default_clone_root(),
            clone_depth: default_clone_depth(),
            url_template: default_url_template(),
            organizations: HashMap::new(),
        }
    }
}

fn default_clone_root() -> PathBuf {
    PathBuf::from("sources")
}

fn default_clone_depth() -> u32 {
    1
}

fn default_url_template() -> String {
    DEFAULT_URL_TEMPLATE.to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HashingConfig {
    #[serde(default)]
    pub algorithm: HashAlgorithm,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: ByteSize,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_chunk_size() -> ByteSize {
    DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Upper bound on descriptors in flight; 0 means no bound
    #[serde(default)]
    pub max_concurrent: usize,
}

/// Compiler-bootstrap probe settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BootstrapConfig {
    #[serde(default = "default_probe_source")]
    pub probe_source: String,
    /// argv of the tool the probe compiler's output is piped into
    #[serde(default)]
    pub verifier: Option<Vec<String>>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            probe_source: default_probe_source(),
            verifier: None,
        }
    }
}

fn default_probe_source() -> String {
    DEFAULT_PROBE_SOURCE.to_string()
}

/// Custom command steps for one (package, build system) pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OverrideConfig {
    pub package: String,
    pub build_system: BuildSystem,
    pub steps: Vec<Vec<String>>,
}
