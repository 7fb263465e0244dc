//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Document format of a configuration source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Pick the format from a file extension; anything that is not
    /// `.yml`/`.yaml` is read as TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = match format {
        ConfigFormat::Toml => toml::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from a TOML or YAML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse_config(&content, ConfigFormat::from_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Strategy;

    const YAML: &str = r#"
environment: staging
policy_params:
  partner-keys:
    keys: ["k-1", "k-2"]
backend_groups:
  - name: orders-svc
    targets: ["http://127.0.0.1:3003"]
    strategy: least_connections
routes:
  - id: orders
    patterns:
      - path: /orders/:id
        methods: [GET]
    policies:
      - name: key-auth
        params_from: partner-keys
    backend_group: orders-svc
"#;

    const TOML: &str = r#"
[[backend_groups]]
name = "users-svc"
targets = ["http://127.0.0.1:3001", "http://127.0.0.1:3002"]

[[routes]]
id = "users"
backend_group = "users-svc"
timeout_ms = 2500

[[routes.patterns]]
path = "/users/*"

[[routes.policies]]
name = "rate-limit"
params = { rate_per_second = 5 }
"#;

    #[test]
    fn test_parse_yaml() {
        let config = parse_config(YAML, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.environment.as_deref(), Some("staging"));
        assert_eq!(config.backend_groups[0].strategy, Strategy::LeastConnections);
        assert_eq!(config.routes[0].policies[0].params_from.as_deref(), Some("partner-keys"));
        assert_eq!(config.routes[0].patterns[0].methods, vec!["GET".to_string()]);
    }

    #[test]
    fn test_parse_toml() {
        let config = parse_config(TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(config.backend_groups[0].strategy, Strategy::RoundRobin);
        assert_eq!(config.backend_groups[0].targets.len(), 2);
        assert_eq!(config.routes[0].timeout_ms, Some(2500));
        assert_eq!(config.routes[0].policies[0].params["rate_per_second"], 5);
    }

    #[test]
    fn test_validation_failure_is_reported() {
        let err = parse_config(
            "routes:\n  - id: r\n    patterns: [{path: /}]\n    backend_group: nope\n",
            ConfigFormat::Yaml,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref v) if v.len() == 1));
        assert!(err.to_string().contains("unknown backend group 'nope'"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("gateway.config.yml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("gateway.toml")), ConfigFormat::Toml);
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/gateway.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
