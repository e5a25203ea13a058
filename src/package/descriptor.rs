use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Free-form acquisition/build metadata attached to a descriptor
pub type Metadata = BTreeMap<String, String>;

/// Well-known metadata keys read or written by the pipeline
pub mod keys {
    /// Explicit repository URL for git/github origins
    pub const REPO_URL: &str = "repo_url";
    /// Branch or tag to check out when cloning
    pub const GIT_REF: &str = "git_ref";
    /// Built file, relative to the source directory
    pub const ARTIFACT: &str = "artifact";
    /// Executable name to resolve after an installer build
    pub const EXECUTABLE: &str = "executable";
    /// Resolved location of the installed executable
    pub const EXECUTABLE_PATH: &str = "executable_path";
    /// Compiler used by the compiler-bootstrap handler
    pub const COMPILER: &str = "compiler";
    /// Whitespace separated argv of the probe verification tool
    pub const VERIFIER: &str = "verifier";
    /// How the source location was obtained (local, clone, reused)
    pub const ACQUIRED_VIA: &str = "acquired_via";
    /// URL the source was cloned from
    pub const CLONED_FROM: &str = "cloned_from";
    /// Handler that produced the build
    pub const BUILT_WITH: &str = "built_with";
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("package name must be a non-empty string")]
    EmptyName,
    #[error("version of '{0}' must be a non-empty string")]
    EmptyVersion(String),
    #[error("invalid origin '{0}', expected one of: {allowed}", allowed = Origin::ALL_NAMES.join(", "))]
    UnknownOrigin(String),
    #[error("unsupported build system '{0}', expected one of: {allowed}", allowed = BuildSystem::ALL_NAMES.join(", "))]
    UnknownBuildSystem(String),
}

/// Where a package's source comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Git,
    Github,
    Deb,
    Rpm,
    Pacman,
    Pypi,
    Http,
}

impl Origin {
    pub const ALL_NAMES: &'static [&'static str] =
        &["local", "git", "github", "deb", "rpm", "pacman", "pypi", "http"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Local => "local",
            Origin::Git => "git",
            Origin::Github => "github",
            Origin::Deb => "deb",
            Origin::Rpm => "rpm",
            Origin::Pacman => "pacman",
            Origin::Pypi => "pypi",
            Origin::Http => "http",
        }
    }

    /// Origins acquired through a version-control clone
    pub fn is_version_control(&self) -> bool {
        matches!(self, Origin::Git | Origin::Github)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Origin::Local),
            "git" => Ok(Origin::Git),
            "github" => Ok(Origin::Github),
            "deb" => Ok(Origin::Deb),
            "rpm" => Ok(Origin::Rpm),
            "pacman" => Ok(Origin::Pacman),
            "pypi" => Ok(Origin::Pypi),
            "http" => Ok(Origin::Http),
            _ => Err(DescriptorError::UnknownOrigin(s.to_string())),
        }
    }
}

/// Build workflow selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildSystem {
    Make,
    Cmake,
    Ninja,
    Meson,
    Autotools,
    Scons,
    Waf,
    Setuptools,
    Poetry,
    Pip,
    Go,
    Cargo,
    CompilerBootstrap,
}

impl BuildSystem {
    pub const ALL: &'static [BuildSystem] = &[
        BuildSystem::Make,
        BuildSystem::Cmake,
        BuildSystem::Ninja,
        BuildSystem::Meson,
        BuildSystem::Autotools,
        BuildSystem::Scons,
        BuildSystem::Waf,
        BuildSystem::Setuptools,
        BuildSystem::Poetry,
        BuildSystem::Pip,
        BuildSystem::Go,
        BuildSystem::Cargo,
        BuildSystem::CompilerBootstrap,
    ];

    pub const ALL_NAMES: &'static [&'static str] = &[
        "make",
        "cmake",
        "ninja",
        "meson",
        "autotools",
        "scons",
        "waf",
        "setuptools",
        "poetry",
        "pip",
        "go",
        "cargo",
        "compiler-bootstrap",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildSystem::Make => "make",
            BuildSystem::Cmake => "cmake",
            BuildSystem::Ninja => "ninja",
            BuildSystem::Meson => "meson",
            BuildSystem::Autotools => "autotools",
            BuildSystem::Scons => "scons",
            BuildSystem::Waf => "waf",
            BuildSystem::Setuptools => "setuptools",
            BuildSystem::Poetry => "poetry",
            BuildSystem::Pip => "pip",
            BuildSystem::Go => "go",
            BuildSystem::Cargo => "cargo",
            BuildSystem::CompilerBootstrap => "compiler-bootstrap",
        }
    }
}

impl fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildSystem {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        BuildSystem::ALL
            .iter()
            .copied()
            .find(|bs| bs.as_str() == normalized)
            .ok_or_else(|| DescriptorError::UnknownBuildSystem(s.to_string()))
    }
}

/// One package to acquire and build.
///
/// Descriptors are values: every stage of the pipeline consumes one and
/// returns an updated copy through the `with_*` methods below. Changing the
/// location always drops the digest, since a digest only describes the file
/// the location pointed to when it was computed.
///
/// Serialize-only: descriptors are built through [`PackageDescriptor::new`]
/// (directly or from a manifest entry), which rejects empty names and
/// versions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageDescriptor {
    name: String,
    version: String,
    origin: Origin,
    location: Option<PathBuf>,
    build_system: Option<BuildSystem>,
    digest: Option<String>,
    metadata: Metadata,
    created_at: DateTime<Utc>,
}

impl PackageDescriptor {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        origin: Origin,
    ) -> Result<Self, DescriptorError> {
        let name = name.into();
        let version = version.into();

        if name.trim().is_empty() {
            return Err(DescriptorError::EmptyName);
        }
        if version.trim().is_empty() {
            return Err(DescriptorError::EmptyVersion(name));
        }

        Ok(Self {
            name,
            version,
            origin,
            location: None,
            build_system: None,
            digest: None,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn build_system(&self) -> Option<BuildSystem> {
        self.build_system
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Set the on-disk location; drops the digest when the path changes
    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        let location = location.into();
        if self.location.as_deref() != Some(location.as_path()) {
            self.digest = None;
        }
        self.location = Some(location);
        self
    }

    pub fn with_build_system(mut self, build_system: BuildSystem) -> Self {
        self.build_system = Some(build_system);
        self
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata_entries<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.metadata.extend(entries);
        self
    }

    /// Directory holding the sources: the location itself, or its parent
    /// when the location names a file.
    pub fn source_dir(&self) -> Option<PathBuf> {
        let location = self.location.as_ref()?;
        if location.is_file() {
            let parent = location.parent().filter(|p| !p.as_os_str().is_empty());
            Some(parent.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")))
        } else {
            Some(location.clone())
        }
    }
}

impl fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{} ({})", self.name, self.version, self.origin)
    }
}
