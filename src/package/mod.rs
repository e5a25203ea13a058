//! Package descriptors and manifest loading
//!
//! A [`PackageDescriptor`] identifies one package to acquire and build. The
//! calling layer creates descriptors (directly or from a TOML [`Manifest`]);
//! the pipeline threads them through acquisition, build and hashing as
//! values and hands back the finished copy.

mod descriptor;
mod validation;

pub use descriptor::{BuildSystem, DescriptorError, Metadata, Origin, PackageDescriptor, keys};
pub use validation::{Manifest, ManifestError, PackageSpec, validate_batch};
