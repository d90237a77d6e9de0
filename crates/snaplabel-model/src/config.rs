//! Model artifact configuration

use crate::source::{ArtifactSource, HttpSource, GOOGLE_DRIVE_TEMPLATE};
use serde::{Deserialize, Serialize};
use snaplabel_core::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Where the model comes from and where it is cached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Remote content identifier, turned into a URL by the source.
    ///
    /// May stay empty when the artifact is already cached at `local_path`.
    #[serde(default)]
    pub remote_id: String,

    /// Local cache file
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,

    /// Remote source kind
    #[serde(default)]
    pub source: SourceSpec,

    /// Expected SHA-256 of a fresh download (lowercase hex)
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Remote artifact source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSpec {
    /// Publicly shared Google Drive file id
    #[default]
    Gdrive,

    /// Any HTTP(S) server; `{id}` in the template is replaced by the identifier
    Http { url_template: String },

    /// Hugging Face Hub; the identifier is `owner/repo/path/in/repo`
    HuggingFace {
        #[serde(default = "default_revision")]
        revision: String,
    },
}

fn default_local_path() -> PathBuf {
    PathBuf::from("model.safetensors")
}

fn default_revision() -> String {
    "main".to_string()
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            remote_id: String::new(),
            local_path: default_local_path(),
            source: SourceSpec::default(),
            sha256: None,
        }
    }
}

impl ModelSettings {
    /// Check the settings for obvious mistakes
    pub fn validate(&self) -> Result<()> {
        if self.local_path.as_os_str().is_empty() {
            return Err(Error::config("model.local_path must not be empty"));
        }

        if let Some(digest) = &self.sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(Error::config(
                    "model.sha256 must be 64 hexadecimal characters",
                ));
            }
        }

        if let SourceSpec::Http { url_template } = &self.source {
            if !url_template.contains("{id}") {
                return Err(Error::config(
                    "model.source.url_template must contain an {id} placeholder",
                ));
            }
        }

        Ok(())
    }

    /// Instantiate the configured source
    pub fn build_source(&self) -> Result<Arc<dyn ArtifactSource>> {
        match &self.source {
            SourceSpec::Gdrive => Ok(Arc::new(HttpSource::new(GOOGLE_DRIVE_TEMPLATE)?)),
            SourceSpec::Http { url_template } => Ok(Arc::new(HttpSource::new(url_template)?)),
            #[cfg(feature = "hf-hub-source")]
            SourceSpec::HuggingFace { revision } => Ok(Arc::new(
                crate::source::HuggingFaceSource::new(revision.clone()),
            )),
            #[cfg(not(feature = "hf-hub-source"))]
            SourceSpec::HuggingFace { .. } => Err(Error::config(
                "Hugging Face source requires the 'hf-hub-source' feature",
            )),
        }
    }
}
