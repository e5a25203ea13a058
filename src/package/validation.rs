use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::descriptor::{DescriptorError, Metadata, PackageDescriptor, keys};

const MAX_NAME_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("manifest contains no packages")]
    Empty,
    #[error("package #{index}: {source}")]
    Descriptor {
        index: usize,
        source: DescriptorError,
    },
    #[error("package name '{0}' exceeds {MAX_NAME_LEN} characters")]
    NameTooLong(String),
    #[error("package name '{0}' is not usable as a directory name")]
    InvalidName(String),
    #[error("package names must be unique, '{0}' appears twice")]
    DuplicateName(String),
    #[error("package '{0}' has a non-http(s)/git repo_url")]
    InvalidRepoUrl(String),
}

/// One `[[packages]]` entry as written by the operator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,
    pub origin: String,
    pub location: Option<PathBuf>,
    pub build_system: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl PackageSpec {
    pub fn into_descriptor(self) -> Result<PackageDescriptor, DescriptorError> {
        let origin = self.origin.parse()?;
        let mut descriptor =
            PackageDescriptor::new(self.name, self.version, origin)?.with_metadata_entries(self.metadata);

        if let Some(location) = self.location {
            descriptor = descriptor.with_location(location);
        }
        if let Some(build_system) = self.build_system {
            descriptor = descriptor.with_build_system(build_system.parse()?);
        }

        Ok(descriptor)
    }
}

/// Package manifest file (`[[packages]]` tables)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Manifest {
    #[serde(default)]
    pub packages: Vec<PackageSpec>,
}

impl Manifest {
    pub fn from_toml(content: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Convert every entry and check batch-level invariants
    pub fn into_descriptors(self) -> Result<Vec<PackageDescriptor>, ManifestError> {
        if self.packages.is_empty() {
            return Err(ManifestError::Empty);
        }

        let descriptors = self
            .packages
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                spec.into_descriptor()
                    .map_err(|source| ManifestError::Descriptor { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        validate_batch(&descriptors)?;
        Ok(descriptors)
    }
}

/// Batch checks applied before submission.
///
/// Names double as clone-target directory names, so they must be unique
/// and free of path separators.
pub fn validate_batch(descriptors: &[PackageDescriptor]) -> Result<(), ManifestError> {
    let mut seen = HashSet::new();

    for descriptor in descriptors {
        let name = descriptor.name();

        if name.len() > MAX_NAME_LEN {
            return Err(ManifestError::NameTooLong(name.to_string()));
        }

        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(ManifestError::InvalidName(name.to_string()));
        }

        if !seen.insert(name.to_string()) {
            return Err(ManifestError::DuplicateName(name.to_string()));
        }

        if let Some(url) = descriptor.get_metadata(keys::REPO_URL) {
            let supported = ["http://", "https://", "git://", "ssh://", "file://", "git@"];
            if !supported.iter().any(|scheme| url.starts_with(scheme)) {
                return Err(ManifestError::InvalidRepoUrl(name.to_string()));
            }
        }
    }

    Ok(())
}
