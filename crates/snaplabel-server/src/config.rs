//! Service configuration

use crate::cli::{Cli, Commands};
use serde::{Deserialize, Serialize};
use snaplabel_core::{Error, Result};
use snaplabel_model::{ModelSettings, SourceSpec};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Model artifact settings
    #[serde(default)]
    pub model: ModelSettings,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Listen address
    #[serde(default = "default_address")]
    pub address: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Number of recent normalized images kept for redisplay (0 disables)
    #[serde(default = "default_recent_results")]
    pub recent_results: usize,

    /// Load the model at startup instead of on the first request
    #[serde(default)]
    pub eager_load: bool,

    /// Per-request timeout in seconds (0 disables)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            recent_results: default_recent_results(),
            eager_load: false,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Upper bound on `server.recent_results`
pub const MAX_RECENT_RESULTS: usize = 1024;

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8501
}

fn default_max_upload_bytes() -> usize {
    200 * 1024 * 1024
}

fn default_recent_results() -> usize {
    32
}

fn default_request_timeout() -> u64 {
    120
}

impl ServerConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &Path, cli: &Cli) -> Result<Self> {
        let mut config = Self::from_file(config_path)?;
        config.apply_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    /// Parse the file if it exists, defaults otherwise
    pub fn from_file(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path).map_err(|e| {
            Error::config(format!("cannot read {}: {}", config_path.display(), e))
        })?;
        Self::from_yaml(&content)
            .map_err(|e| Error::config(format!("{}: {}", config_path.display(), e)))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        let model = &cli.model;
        if let Some(id) = &model.model_id {
            self.model.remote_id = id.clone();
        }
        if let Some(path) = &model.model_path {
            self.model.local_path = path.clone();
        }
        if let Some(template) = &model.url_template {
            self.model.source = SourceSpec::Http {
                url_template: template.clone(),
            };
        }
        if let Some(digest) = &model.sha256 {
            self.model.sha256 = Some(digest.clone());
        }

        if let Commands::Serve {
            address,
            port,
            eager,
        } = &cli.command
        {
            if let Some(address) = address {
                self.server.address = address.clone();
            }
            if let Some(port) = port {
                self.server.port = *port;
            }
            if *eager {
                self.server.eager_load = true;
            }
        }
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::config("server.port must not be 0"));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(Error::config("server.max_upload_bytes must be positive"));
        }
        if self.server.recent_results > MAX_RECENT_RESULTS {
            return Err(Error::config(format!(
                "server.recent_results must be at most {}",
                MAX_RECENT_RESULTS
            )));
        }

        self.model.validate()?;

        // Without an identifier only an existing cache file can be used
        if self.model.remote_id.trim().is_empty() && !self.model.local_path.exists() {
            return Err(Error::config(format!(
                "model.remote_id is empty and no artifact is cached at {}",
                self.model.local_path.display()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("snaplabel").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_yaml("{}").unwrap();
        assert_eq!(config.server.address, "127.0.0.1");
        assert_eq!(config.server.port, 8501);
        assert_eq!(config.server.recent_results, 32);
        assert!(!config.server.eager_load);
        assert_eq!(config.model.source, SourceSpec::Gdrive);
    }

    #[test]
    fn test_parse_full_file() {
        let yaml = r#"
server:
  address: 0.0.0.0
  port: 9000
  max_upload_bytes: 1048576
  recent_results: 0
  eager_load: true
  request_timeout_secs: 0
model:
  remote_id: pets-v2
  local_path: /var/cache/snaplabel/pets.safetensors
  source:
    type: http
    url_template: https://models.example.com/{id}.safetensors
"#;
        let config = ServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.recent_results, 0);
        assert!(config.server.eager_load);
        assert_eq!(config.server.request_timeout(), None);
        assert_eq!(config.model.remote_id, "pets-v2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_file_parses() {
        let config = ServerConfig::from_yaml(include_str!("../../../snaplabel.example.yaml")).unwrap();
        assert_eq!(config.server.port, 8501);
        assert_eq!(config.model.source, SourceSpec::Gdrive);
    }

    #[test]
    fn test_unknown_source_type_is_rejected() {
        let yaml = "model:\n  source:\n    type: ftp\n";
        assert!(ServerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = ServerConfig::default();
        config.apply_overrides(&cli(&[
            "--model-id",
            "abc",
            "--url-template",
            "http://localhost:9999/{id}",
            "serve",
            "--port",
            "8080",
            "--eager",
        ]));

        assert_eq!(config.model.remote_id, "abc");
        assert_eq!(
            config.model.source,
            SourceSpec::Http {
                url_template: "http://localhost:9999/{id}".to_string()
            }
        );
        assert_eq!(config.server.port, 8080);
        assert!(config.server.eager_load);
    }

    #[test]
    fn test_validate_requires_identifier_or_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.model.local_path = dir.path().join("model.safetensors");

        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), snaplabel_core::ErrorKind::Config);

        std::fs::write(&config.model.local_path, b"cached").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_limits() {
        let mut config = ServerConfig::default();
        config.model.remote_id = "abc".to_string();
        assert!(config.validate().is_ok());

        config.server.port = 0;
        assert!(config.validate().is_err());

        config.server.port = 8501;
        config.server.max_upload_bytes = 0;
        assert!(config.validate().is_err());

        config.server.max_upload_bytes = 1024;
        config.server.recent_results = MAX_RECENT_RESULTS + 1;
        assert!(config.validate().is_err());

        config.server.recent_results = MAX_RECENT_RESULTS;
        assert!(config.validate().is_ok());

        config.model.sha256 = Some("xyz".to_string());
        assert!(config.validate().is_err());
    }
}
