use std::collections::HashMap;

use crate::package::{PackageDescriptor, keys};

pub const DEFAULT_URL_TEMPLATE: &str = "https://github.com/{org}/{name}.git";

/// Where a repository URL came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlSource {
    Metadata,
    OrganizationTable,
}

/// Derives clone URLs from descriptor metadata, falling back to an
/// operator-supplied name→organization table rendered through a template.
#[derive(Debug, Clone)]
pub struct RepoUrlResolver {
    template: String,
    organizations: HashMap<String, String>,
}

impl RepoUrlResolver {
    pub fn new(template: impl Into<String>, organizations: HashMap<String, String>) -> Self {
        Self {
            template: template.into(),
            organizations,
        }
    }

    pub fn resolve(&self, descriptor: &PackageDescriptor) -> Option<(String, UrlSource)> {
        if let Some(url) = descriptor.get_metadata(keys::REPO_URL) {
            let url = url.trim();
            if !url.is_empty() {
                return Some((url.to_string(), UrlSource::Metadata));
            }
        }

        let org = self.organizations.get(descriptor.name())?;
        let url = self
            .template
            .replace("{org}", org)
            .replace("{name}", descriptor.name());
        Some((url, UrlSource::OrganizationTable))
    }
}

impl Default for RepoUrlResolver {
    fn default() -> Self {
        Self::new(DEFAULT_URL_TEMPLATE, HashMap::new())
    }
}
