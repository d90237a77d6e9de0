use crate::config::ServerConfig;
use crate::state::RecentImages;
use metrics_exporter_prometheus::PrometheusHandle;
use snaplabel_model::ModelService;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Service configuration
    pub config: Arc<ServerConfig>,

    /// Lazily initialized predictor
    pub model: Arc<ModelService>,

    /// Recent normalized images for redisplay
    pub recent: Arc<RecentImages>,

    /// Prometheus renderer, absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: ServerConfig, model: ModelService) -> Self {
        let recent = RecentImages::new(config.server.recent_results);
        Self {
            config: Arc::new(config),
            model: Arc::new(model),
            recent: Arc::new(recent),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
