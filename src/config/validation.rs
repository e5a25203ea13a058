use super::models::Config;
use crate::humanize::ByteSize;
use std::collections::HashSet;
use thiserror::Error;

const MAX_CHUNK_SIZE: ByteSize = ByteSize::mib(64);

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("hashing.chunk_size must be between 1B and {max}, got {actual}")]
    InvalidChunkSize { actual: ByteSize, max: ByteSize },

    #[error("override for '{package}' ({build_system}) has no steps")]
    EmptyOverride {
        package: String,
        build_system: String,
    },

    #[error("override for '{package}' ({build_system}) has an empty step at position {index}")]
    EmptyOverrideStep {
        package: String,
        build_system: String,
        index: usize,
    },

    #[error("duplicate override for '{package}' ({build_system})")]
    DuplicateOverride {
        package: String,
        build_system: String,
    },

    #[error("acquire.url_template must contain {{name}}: {template}")]
    InvalidUrlTemplate { template: String },

    #[error("acquire.organizations is set but url_template has no {{org}} placeholder: {template}")]
    UnusedOrganizations { template: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_hashing(config)?;
    validate_overrides(config)?;
    validate_acquire(config)?;
    Ok(())
}

fn validate_hashing(config: &Config) -> Result<(), ValidationError> {
    let chunk_size = config.hashing.chunk_size;
    if chunk_size.as_u64() == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(ValidationError::InvalidChunkSize {
            actual: chunk_size,
            max: MAX_CHUNK_SIZE,
        });
    }
    Ok(())
}

fn validate_overrides(config: &Config) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();

    for entry in &config.overrides {
        let build_system = entry.build_system.to_string();

        if entry.steps.is_empty() {
            return Err(ValidationError::EmptyOverride {
                package: entry.package.clone(),
                build_system,
            });
        }

        if let Some(index) = entry.steps.iter().position(Vec::is_empty) {
            return Err(ValidationError::EmptyOverrideStep {
                package: entry.package.clone(),
                build_system,
                index,
            });
        }

        if !seen.insert((entry.package.as_str(), entry.build_system)) {
            return Err(ValidationError::DuplicateOverride {
                package: entry.package.clone(),
                build_system,
            });
        }
    }

    Ok(())
}

fn validate_acquire(config: &Config) -> Result<(), ValidationError> {
    let template = &config.acquire.url_template;

    if !template.contains("{name}") {
        return Err(ValidationError::InvalidUrlTemplate {
            template: template.clone(),
        });
    }

    if !config.acquire.organizations.is_empty() && !template.contains("{org}") {
        return Err(ValidationError::UnusedOrganizations {
            template: template.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::OverrideConfig;
    use crate::package::BuildSystem;

    fn make_override(package: &str, steps: Vec<Vec<String>>) -> OverrideConfig {
        OverrideConfig {
            package: package.to_string(),
            build_system: BuildSystem::Make,
            steps,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_chunk_size_bounds() {
        let mut config = Config::default();
        config.hashing.chunk_size = ByteSize(0);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidChunkSize { .. })
        ));

        config.hashing.chunk_size = ByteSize::mib(65);
        assert!(validate(&config).is_err());

        config.hashing.chunk_size = ByteSize::mib(64);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_override_without_steps() {
        let mut config = Config::default();
        config.overrides.push(make_override("foo", vec![]));

        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyOverride { .. }));
        assert!(err.to_string().contains("'foo' (make)"));
    }

    #[test]
    fn test_override_with_empty_step() {
        let mut config = Config::default();
        config
            .overrides
            .push(make_override("foo", vec![vec!["make".into()], vec![]]));

        assert!(matches!(
            validate(&config),
            Err(ValidationError::EmptyOverrideStep { index: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_override() {
        let mut config = Config::default();
        config
            .overrides
            .push(make_override("foo", vec![vec!["make".into()]]));
        config
            .overrides
            .push(make_override("foo", vec![vec!["make".into(), "all".into()]]));

        assert!(matches!(
            validate(&config),
            Err(ValidationError::DuplicateOverride { .. })
        ));
    }

    #[test]
    fn test_url_template_rules() {
        let mut config = Config::default();
        config.acquire.url_template = "https://git.example.org/mirror.git".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidUrlTemplate { .. })
        ));

        config.acquire.url_template = "https://git.example.org/{name}.git".to_string();
        assert!(validate(&config).is_ok());

        config
            .acquire
            .organizations
            .insert("foo".to_string(), "foo-org".to_string());
        assert!(matches!(
            validate(&config),
            Err(ValidationError::UnusedOrganizations { .. })
        ));
    }
}
