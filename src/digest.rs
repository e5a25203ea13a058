//! Streaming file digests used for provenance
//!
//! Files are read in fixed-size chunks, so memory use does not grow with
//! the file. A missing path or a path that is not a regular file yields
//! [`DigestError::NotAFile`], which the orchestrator treats as "skip
//! hashing" rather than a failure.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::humanize::ByteSize;

pub const DEFAULT_CHUNK_SIZE: ByteSize = ByteSize::kib(64);

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("unsupported digest algorithm '{0}', expected sha256, sha1 or md5")]
    UnknownAlgorithm(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// 256-bit
    #[default]
    Sha256,
    /// 160-bit
    Sha1,
    /// 128-bit
    Md5,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Md5 => "md5",
        }
    }

    /// Length of the hex digest
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Md5 => 32,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "md5" => Ok(HashAlgorithm::Md5),
            _ => Err(DigestError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Computes hex digests of files with a fixed algorithm and chunk size
#[derive(Debug, Clone, Copy)]
pub struct Digester {
    algorithm: HashAlgorithm,
    chunk_size: usize,
}

impl Digester {
    pub fn new(algorithm: HashAlgorithm, chunk_size: ByteSize) -> Self {
        Self {
            algorithm,
            chunk_size: chunk_size.as_usize().max(1),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub async fn digest(&self, path: &Path) -> Result<String, DigestError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DigestError::NotAFile(path.to_path_buf()));
            }
            Err(source) => {
                return Err(DigestError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if !metadata.is_file() {
            return Err(DigestError::NotAFile(path.to_path_buf()));
        }

        let file = File::open(path).await.map_err(|source| DigestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let hex = match self.algorithm {
            HashAlgorithm::Sha256 => stream::<Sha256>(file, self.chunk_size, path).await?,
            HashAlgorithm::Sha1 => stream::<Sha1>(file, self.chunk_size, path).await?,
            HashAlgorithm::Md5 => stream::<Md5>(file, self.chunk_size, path).await?,
        };

        debug!(path = %path.display(), algorithm = %self.algorithm, digest = %hex, "digest computed");
        Ok(hex)
    }
}

impl Default for Digester {
    fn default() -> Self {
        Self::new(HashAlgorithm::default(), DEFAULT_CHUNK_SIZE)
    }
}

/// Digest `path` with the default chunk size
pub async fn digest(path: &Path, algorithm: HashAlgorithm) -> Result<String, DigestError> {
    Digester::new(algorithm, DEFAULT_CHUNK_SIZE).digest(path).await
}

async fn stream<D: Digest>(
    mut file: File,
    chunk_size: usize,
    path: &Path,
) -> Result<String, DigestError> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; chunk_size];

    loop {
        let n = file.read(&mut buf).await.map_err(|source| DigestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_fixture(dir: &TempDir, content: &[u8]) -> PathBuf {
        let path = dir.path().join("artifact.bin");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_known_vectors() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_fixture(&temp_dir, b"abc");

        assert_eq!(
            digest(&path, HashAlgorithm::Sha256).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            digest(&path, HashAlgorithm::Sha1).await.unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            digest(&path, HashAlgorithm::Md5).await.unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[tokio::test]
    async fn test_deterministic_across_runs_and_chunk_sizes() {
        let temp_dir = TempDir::new().unwrap();
        let content: Vec<u8> = (0..100_000u32).flat_map(|i| i.to_le_bytes()).collect();
        let path = write_fixture(&temp_dir, &content);

        let first = digest(&path, HashAlgorithm::Sha256).await.unwrap();
        let second = digest(&path, HashAlgorithm::Sha256).await.unwrap();
        let tiny_chunks = Digester::new(HashAlgorithm::Sha256, ByteSize(7))
            .digest(&path)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first, tiny_chunks);
        assert_eq!(first.len(), HashAlgorithm::Sha256.hex_len());
    }

    #[tokio::test]
    async fn test_missing_path_is_not_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.bin");

        let err = digest(&missing, HashAlgorithm::Sha256).await.unwrap_err();
        assert!(matches!(err, DigestError::NotAFile(path) if path == missing));
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = digest(temp_dir.path(), HashAlgorithm::Md5).await.unwrap_err();
        assert!(matches!(err, DigestError::NotAFile(_)));
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("SHA-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("sha1".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha1);
        assert!(matches!(
            "blake3".parse::<HashAlgorithm>(),
            Err(DigestError::UnknownAlgorithm(_))
        ));
    }
}
