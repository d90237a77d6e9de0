//! Download-once artifact cache

use crate::config::ModelSettings;
use crate::source::ArtifactSource;
use sha2::{Digest, Sha256};
use snaplabel_core::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Makes sure the model artifact exists on local disk.
///
/// A file already present at the target path is trusted as-is. Otherwise the
/// artifact is streamed from the source into `<path>.part` and renamed into
/// place once complete, so an interrupted transfer never leaves a file that a
/// later run would mistake for a cached artifact.
pub struct ArtifactFetcher {
    source: Arc<dyn ArtifactSource>,
    expected_sha256: Option<String>,
}

impl ArtifactFetcher {
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            source,
            expected_sha256: None,
        }
    }

    /// Verify freshly downloaded bytes against a SHA-256 digest
    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.expected_sha256 = Some(digest.into().to_ascii_lowercase());
        self
    }

    /// Build a fetcher for the configured source
    pub fn from_settings(settings: &ModelSettings) -> Result<Self> {
        let fetcher = Self::new(settings.build_source()?);
        Ok(match &settings.sha256 {
            Some(digest) => fetcher.with_sha256(digest.clone()),
            None => fetcher,
        })
    }

    /// Return `local_path`, downloading `remote_id` into it first if missing
    pub async fn ensure_local(&self, remote_id: &str, local_path: &Path) -> Result<PathBuf> {
        let exists = tokio::fs::try_exists(local_path).await.map_err(|e| {
            Error::download(format!("cannot inspect {}: {}", local_path.display(), e))
        })?;
        if exists {
            debug!(path = %local_path.display(), "Using cached model artifact");
            return Ok(local_path.to_path_buf());
        }

        validate_remote_id(remote_id)?;

        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::download(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let partial = partial_path(local_path);
        info!(
            from = %self.source.describe(remote_id),
            to = %local_path.display(),
            "Downloading model artifact"
        );

        let started = Instant::now();
        match self.download(remote_id, &partial).await {
            Ok(bytes) => {
                tokio::fs::rename(&partial, local_path).await.map_err(|e| {
                    Error::download(format!(
                        "cannot move {} into place: {}",
                        partial.display(),
                        e
                    ))
                })?;

                metrics::counter!("snaplabel_artifact_downloads_total").increment(1);
                info!(
                    bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model artifact downloaded"
                );
                Ok(local_path.to_path_buf())
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %partial.display(), "Failed to remove partial download: {}", cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    async fn download(&self, remote_id: &str, partial: &Path) -> Result<u64> {
        let bytes = self.source.fetch(remote_id, partial).await?;

        if let Some(expected) = &self.expected_sha256 {
            let actual = sha256_file(partial).await?;
            if &actual != expected {
                return Err(Error::download(format!(
                    "checksum mismatch for '{}': expected {}, got {}",
                    remote_id, expected, actual
                )));
            }
            debug!(sha256 = %actual, "Checksum verified");
        }

        Ok(bytes)
    }
}

/// Reject identifiers that cannot name a remote file
fn validate_remote_id(remote_id: &str) -> Result<()> {
    if remote_id.trim().is_empty() {
        return Err(Error::download(
            "no remote identifier configured and no cached artifact present",
        ));
    }
    if remote_id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::download(format!(
            "invalid remote identifier '{}'",
            remote_id.escape_debug()
        )));
    }
    if remote_id.split('/').any(|segment| segment == "..") {
        return Err(Error::download(format!(
            "invalid remote identifier '{}'",
            remote_id
        )));
    }
    Ok(())
}

fn partial_path(local_path: &Path) -> PathBuf {
    let mut name: OsString = local_path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn sha256_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok::<_, std::io::Error>(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| Error::download(format!("checksum task failed: {}", e)))?
    .map_err(|e| Error::download(format!("cannot hash download: {}", e)))
}
