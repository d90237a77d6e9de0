//! Process-wide model state

use crate::config::ModelSettings;
use crate::fetcher::ArtifactFetcher;
use crate::pipeline::InferencePipeline;
use crate::predictor::{CandleLoader, PredictorLoader};
use snaplabel_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::OnceCell;
use tracing::info;

/// The pipeline together with where and when it was loaded
pub struct LoadedModel {
    pub pipeline: InferencePipeline,
    pub path: PathBuf,
    pub loaded_at: SystemTime,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("predictor", &self.pipeline.predictor().name())
            .field("path", &self.path)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Owns the fetch-then-load sequence and its result.
///
/// The model is built at most once per service, even when many callers ask
/// for it concurrently before it exists; they all wait on the same
/// initialization. Initialization runs on its own task, so a caller that
/// gives up waiting does not abort a download in progress. A failed
/// initialization leaves the service empty, so the next caller starts over.
pub struct ModelService {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: ArtifactFetcher,
    loader: Arc<dyn PredictorLoader>,
    remote_id: String,
    local_path: PathBuf,
    model: OnceCell<Arc<LoadedModel>>,
}

impl ModelService {
    pub fn new(
        fetcher: ArtifactFetcher,
        loader: Arc<dyn PredictorLoader>,
        remote_id: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                loader,
                remote_id: remote_id.into(),
                local_path: local_path.into(),
                model: OnceCell::new(),
            }),
        }
    }

    /// Service for the configured source, loading with Candle
    pub fn from_settings(settings: &ModelSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::new(
            ArtifactFetcher::from_settings(settings)?,
            Arc::new(CandleLoader),
            settings.remote_id.clone(),
            settings.local_path.clone(),
        ))
    }

    /// The loaded model, fetching and loading it on first use
    pub async fn get(&self) -> Result<Arc<LoadedModel>> {
        if let Some(model) = self.ready() {
            return Ok(model);
        }

        // The task holds the cell's init slot; later callers queue behind it
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner
                .model
                .get_or_try_init(|| inner.initialize())
                .await
                .map(Arc::clone)
        })
        .await
        .map_err(|e| Error::model_load(format!("model initialization task failed: {}", e)))?
    }

    /// The loaded model, if initialization already happened
    pub fn ready(&self) -> Option<Arc<LoadedModel>> {
        self.inner.model.get().cloned()
    }

    pub fn local_path(&self) -> &Path {
        &self.inner.local_path
    }

    pub fn remote_id(&self) -> &str {
        &self.inner.remote_id
    }
}

impl Inner {
    async fn initialize(&self) -> Result<Arc<LoadedModel>> {
        let path = self
            .fetcher
            .ensure_local(&self.remote_id, &self.local_path)
            .await?;

        info!(path = %path.display(), "Loading model");
        let loader = Arc::clone(&self.loader);
        let load_path = path.clone();
        let pipeline = tokio::task::spawn_blocking(move || {
            InferencePipeline::load(&load_path, loader.as_ref())
        })
        .await
        .map_err(|e| Error::model_load(format!("model load task failed: {}", e)))??;

        info!(
            predictor = pipeline.predictor().name(),
            classes = pipeline.vocabulary().len(),
            "Model ready"
        );

        Ok(Arc::new(LoadedModel {
            pipeline,
            path,
            loaded_at: SystemTime::now(),
        }))
    }
}
