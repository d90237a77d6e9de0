//! Remote artifact sources

use async_trait::async_trait;
use futures_util::StreamExt;
use snaplabel_core::{Error, Result};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Direct-download endpoint for publicly shared Google Drive files.
///
/// `confirm=t` skips the interstitial page Drive serves for large files.
pub const GOOGLE_DRIVE_TEMPLATE: &str =
    "https://drive.usercontent.google.com/download?id={id}&export=download&confirm=t";

/// Log download progress every this many bytes
const PROGRESS_STEP: u64 = 8 * 1024 * 1024;

/// A place model artifacts can be downloaded from
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Human-readable location of `remote_id`, for logs
    fn describe(&self, remote_id: &str) -> String;

    /// Write the artifact identified by `remote_id` to `dest`.
    ///
    /// Returns the number of bytes written.
    async fn fetch(&self, remote_id: &str, dest: &Path) -> Result<u64>;
}

/// Plain HTTP(S) GET, streamed to disk
pub struct HttpSource {
    client: reqwest::Client,
    url_template: String,
}

impl HttpSource {
    /// Create a source from a URL template containing `{id}`
    pub fn new(url_template: impl Into<String>) -> Result<Self> {
        let url_template = url_template.into();
        if !url_template.contains("{id}") {
            return Err(Error::config(format!(
                "URL template '{}' has no {{id}} placeholder",
                url_template
            )));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("snaplabel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url_template,
        })
    }

    /// Source for publicly shared Google Drive files
    pub fn google_drive() -> Result<Self> {
        Self::new(GOOGLE_DRIVE_TEMPLATE)
    }

    /// Download URL for an identifier
    pub fn url_for(&self, remote_id: &str) -> String {
        self.url_template.replace("{id}", remote_id)
    }
}

#[async_trait]
impl ArtifactSource for HttpSource {
    fn describe(&self, remote_id: &str) -> String {
        self.url_for(remote_id)
    }

    async fn fetch(&self, remote_id: &str, dest: &Path) -> Result<u64> {
        let url = self.url_for(remote_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::download(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::download(format!(
                "HTTP {} while downloading {}",
                status, url
            )));
        }

        // Drive answers unknown or private ids with an HTML page and a 200
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/html"));
        if is_html {
            return Err(Error::download(format!(
                "{} returned an HTML page instead of the artifact; check that '{}' exists and is publicly shared",
                url, remote_id
            )));
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            Error::download(format!("cannot create {}: {}", dest.display(), e))
        })?;

        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        let mut next_report = PROGRESS_STEP;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| Error::download(format!("transfer from {} failed: {}", url, e)))?;
            file.write_all(&chunk).await.map_err(|e| {
                Error::download(format!("cannot write {}: {}", dest.display(), e))
            })?;

            written += chunk.len() as u64;
            if written >= next_report {
                debug!(written, total, "download progress");
                next_report += PROGRESS_STEP;
            }
        }

        file.flush()
            .await
            .map_err(|e| Error::download(format!("cannot write {}: {}", dest.display(), e)))?;

        if written == 0 {
            return Err(Error::download(format!("{} returned an empty body", url)));
        }

        Ok(written)
    }
}

/// Files stored in a Hugging Face Hub model repository.
///
/// Identifiers look like `owner/repo/path/to/model.safetensors`.
#[cfg(feature = "hf-hub-source")]
pub struct HuggingFaceSource {
    revision: String,
}

#[cfg(feature = "hf-hub-source")]
impl HuggingFaceSource {
    pub fn new(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
        }
    }

    /// Split an identifier into repository and in-repo file path
    pub fn split_id(remote_id: &str) -> Result<(String, String)> {
        let mut parts = remote_id.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), Some(file))
                if !owner.is_empty() && !repo.is_empty() && !file.is_empty() =>
            {
                Ok((format!("{}/{}", owner, repo), file.to_string()))
            }
            _ => Err(Error::download(format!(
                "'{}' is not of the form owner/repo/file",
                remote_id
            ))),
        }
    }
}

#[cfg(feature = "hf-hub-source")]
#[async_trait]
impl ArtifactSource for HuggingFaceSource {
    fn describe(&self, remote_id: &str) -> String {
        format!("hf://{}@{}", remote_id, self.revision)
    }

    async fn fetch(&self, remote_id: &str, dest: &Path) -> Result<u64> {
        use hf_hub::{api::sync::Api, Repo, RepoType};

        let (repo_id, filename) = Self::split_id(remote_id)?;
        let revision = self.revision.clone();
        let dest = dest.to_path_buf();

        // hf-hub's sync client blocks
        tokio::task::spawn_blocking(move || {
            let api = Api::new().map_err(|e| {
                Error::download(format!("Failed to initialize Hugging Face API: {}", e))
            })?;
            let repo = api.repo(Repo::with_revision(repo_id.clone(), RepoType::Model, revision));

            let cached = repo.get(&filename).map_err(|e| {
                Error::download(format!(
                    "Failed to download {} from {}: {}",
                    filename, repo_id, e
                ))
            })?;

            std::fs::copy(&cached, &dest).map_err(|e| {
                Error::download(format!("cannot copy {} to {}: {}", cached.display(), dest.display(), e))
            })
        })
        .await
        .map_err(|e| Error::download(format!("download task failed: {}", e)))?
    }
}
