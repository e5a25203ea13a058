//! Build handlers
//!
//! A handler turns an acquired source tree into built output by running
//! the external tools of one build system.
//!
//! ## Key Components
//!
//! - [`BuildHandler`] - trait every handler implements
//! - [`HandlerRegistry`] - picks the handler for a descriptor: per-package
//!   override, then build system, then [`GenericHandler`]
//! - [`StepsHandler`] - ordered command steps (make, cmake, meson, ninja,
//!   autotools, cargo, go and configured overrides)
//! - [`InstallerHandler`] - pip / setuptools / poetry
//! - [`CompilerBootstrapHandler`] - probe compile plus verification
//!
//! ## Example
//!
//! ```rust,ignore
//! use pkgforge::handlers::HandlerRegistry;
//! use pkgforge::process::SystemRunner;
//!
//! let registry = HandlerRegistry::with_defaults();
//! let (handler, output) = registry.dispatch(&descriptor, &SystemRunner::new()).await?;
//! ```

mod bootstrap;
mod default;
mod installer;
mod registry;
mod steps;
mod traits;
pub(crate) mod types;

pub use bootstrap::{CompilerBootstrapHandler, DEFAULT_PROBE_SOURCE};
pub use default::GenericHandler;
pub use installer::InstallerHandler;
pub use registry::{HandlerRegistry, Resolution};
pub use steps::{BUILD_SUBDIR, StepsHandler};
pub use traits::{BuildHandler, HandlerError};
pub use types::HandlerOutput;
