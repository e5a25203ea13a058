use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::bootstrap::CompilerBootstrapHandler;
use super::default::GenericHandler;
use super::installer::InstallerHandler;
use super::steps::StepsHandler;
use super::traits::{BuildHandler, HandlerError};
use super::types::HandlerOutput;
use crate::config::Config;
use crate::package::{BuildSystem, PackageDescriptor};
use crate::process::CommandRunner;

/// Which table a handler was picked from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Registered for this exact (package name, build system) pair
    Override,
    /// Registered for the build system
    BuildSystem,
    /// Nothing registered; the generic handler
    Fallback,
}

/// Maps build systems (and per-package overrides) to handler instances.
///
/// Lookup order is override, then build system, then the generic
/// fallback. Registering again for the same key replaces the earlier
/// handler.
#[derive(Clone)]
pub struct HandlerRegistry {
    overrides: HashMap<(String, BuildSystem), Arc<dyn BuildHandler>>,
    handlers: BTreeMap<BuildSystem, Arc<dyn BuildHandler>>,
    fallback: Arc<dyn BuildHandler>,
}

impl HandlerRegistry {
    /// Empty registry: everything resolves to the generic handler
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
            handlers: BTreeMap::new(),
            fallback: Arc::new(GenericHandler::new()),
        }
    }

    pub fn register(&mut self, build_system: BuildSystem, handler: Arc<dyn BuildHandler>) {
        self.handlers.insert(build_system, handler);
    }

    pub fn register_override(
        &mut self,
        package: impl Into<String>,
        build_system: BuildSystem,
        handler: Arc<dyn BuildHandler>,
    ) {
        self.overrides.insert((package.into(), build_system), handler);
    }

    pub fn has_handler(&self, build_system: BuildSystem) -> bool {
        self.handlers.contains_key(&build_system)
    }

    pub fn resolve(&self, package: &str, build_system: BuildSystem) -> (Arc<dyn BuildHandler>, Resolution) {
        if let Some(handler) = self.overrides.get(&(package.to_string(), build_system)) {
            return (handler.clone(), Resolution::Override);
        }
        if let Some(handler) = self.handlers.get(&build_system) {
            return (handler.clone(), Resolution::BuildSystem);
        }
        (self.fallback.clone(), Resolution::Fallback)
    }

    /// Pick the handler for a descriptor and run it.
    ///
    /// A descriptor without a build system is an error; nothing is spawned.
    pub async fn dispatch(
        &self,
        descriptor: &PackageDescriptor,
        runner: &dyn CommandRunner,
    ) -> Result<(String, HandlerOutput), HandlerError> {
        let build_system = descriptor
            .build_system()
            .ok_or_else(|| HandlerError::NoBuildSystem(descriptor.name().to_string()))?;

        let (handler, resolution) = self.resolve(descriptor.name(), build_system);
        debug!(
            handler = handler.name(),
            build_system = %build_system,
            resolution = ?resolution,
            "dispatching build"
        );

        let output = handler.build(descriptor, runner).await?;
        Ok((handler.name().to_string(), output))
    }

    /// Registry with the built-in handler for every build system that has
    /// one, using default program names
    pub fn with_defaults() -> Self {
        Self::from_config(&Config::default())
    }

    /// Built-in handlers wired to the configured tools, plus every
    /// `[[overrides]]` entry as a steps handler
    pub fn from_config(config: &Config) -> Self {
        let tools = &config.tools;
        let mut registry = Self::new();

        registry.register(BuildSystem::Make, Arc::new(StepsHandler::make(&tools.make)));
        registry.register(BuildSystem::Cmake, Arc::new(StepsHandler::cmake(&tools.cmake)));
        registry.register(BuildSystem::Meson, Arc::new(StepsHandler::meson(&tools.meson)));
        registry.register(BuildSystem::Ninja, Arc::new(StepsHandler::ninja(&tools.ninja)));
        registry.register(
            BuildSystem::Autotools,
            Arc::new(StepsHandler::autotools(&tools.make)),
        );
        registry.register(BuildSystem::Cargo, Arc::new(StepsHandler::cargo(&tools.cargo)));
        registry.register(BuildSystem::Go, Arc::new(StepsHandler::go(&tools.go)));

        let installer: Arc<dyn BuildHandler> = Arc::new(InstallerHandler::new(&tools.python));
        for build_system in [BuildSystem::Pip, BuildSystem::Setuptools, BuildSystem::Poetry] {
            registry.register(build_system, installer.clone());
        }

        registry.register(
            BuildSystem::CompilerBootstrap,
            Arc::new(CompilerBootstrapHandler::new(
                config.bootstrap.probe_source.clone(),
                config.bootstrap.verifier.clone(),
            )),
        );

        for entry in &config.overrides {
            let name = format!("override:{}", entry.package);
            registry.register_override(
                entry.package.clone(),
                entry.build_system,
                Arc::new(StepsHandler::new(name, entry.steps.clone())),
            );
        }

        registry
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
