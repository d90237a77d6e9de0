//! HTTP routes and handlers

use crate::state::AppState;
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    BoxError, Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use snaplabel_core::{Error, ErrorKind, PredictionResult, RankedEntry};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Multipart field carrying the upload
pub const UPLOAD_FIELD: &str = "file";

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// 200 once the model is loaded, 503 before that
pub async fn ready(State(state): State<AppState>) -> Response {
    match state.model.ready() {
        Some(model) => Json(json!({
            "status": "ready",
            "classes": model.pipeline.vocabulary().len(),
        }))
        .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "loading" })),
        )
            .into_response(),
    }
}

/// Describe the loaded model, loading it first if needed
pub async fn model_info(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let model = state.model.get().await?;
    let loaded_at: DateTime<Utc> = model.loaded_at.into();

    Ok(Json(json!({
        "architecture": model.pipeline.predictor().name(),
        "labels": model.pipeline.vocabulary().labels(),
        "remote_id": state.model.remote_id(),
        "local_path": model.path.display().to_string(),
        "loaded_at": loaded_at.to_rfc3339(),
    })))
}

/// Response body of `POST /api/predict`
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub request_id: Uuid,

    /// `label`, `index` and `probabilities` in vocabulary order
    #[serde(flatten)]
    pub result: PredictionResult,

    /// Presentation order, predicted label highlighted
    pub ranked: Vec<RankedEntry>,

    /// Where the normalized image can be fetched, if it was kept
    pub image_url: Option<String>,

    pub image: ImageSummary,

    pub inference_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct ImageSummary {
    pub width: u32,
    pub height: u32,
    pub format: String,
}

/// Classify an uploaded image
pub async fn predict(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, AppError> {
    metrics::counter!("snaplabel_requests_total").increment(1);

    let upload = read_upload(&mut multipart).await?;
    let model = state.model.get().await?;

    let request_id = Uuid::new_v4();
    let keep_image = state.recent.is_enabled();

    let (prediction, png) = tokio::task::spawn_blocking(move || {
        let prediction = model.pipeline.predict(&upload)?;
        let png = if keep_image {
            match prediction.image.to_png() {
                Ok(png) => Some(Bytes::from(png)),
                Err(e) => {
                    warn!("Cannot keep image for redisplay: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Ok::<_, Error>((prediction, png))
    })
    .await
    .map_err(|e| Error::inference(format!("prediction task failed: {}", e)))??;

    let image_url = png.map(|png| {
        state.recent.insert(request_id, png);
        format!("/api/predictions/{}/image", request_id)
    });

    let label = prediction.result.label().to_string();
    metrics::counter!("snaplabel_predictions_total", "label" => label.clone()).increment(1);
    metrics::histogram!("snaplabel_inference_latency_us")
        .record(prediction.inference_time.as_micros() as f64);

    info!(
        %request_id,
        label = %label,
        confidence = prediction.result.confidence(),
        "Image classified"
    );

    let ranked = prediction.result.ranked();
    let image = ImageSummary {
        width: prediction.image.width(),
        height: prediction.image.height(),
        format: format!("{:?}", prediction.image.format()).to_lowercase(),
    };

    Ok(Json(PredictResponse {
        request_id,
        result: prediction.result,
        ranked,
        image_url,
        image,
        inference_ms: prediction.inference_time.as_secs_f64() * 1000.0,
    }))
}

async fn read_upload(multipart: &mut Multipart) -> Result<Bytes, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        debug!(
            file_name = field.file_name().unwrap_or("-"),
            content_type = field.content_type().unwrap_or("-"),
            "Receiving upload"
        );
        return Ok(field.bytes().await?);
    }

    Err(AppError::BadRequest(format!(
        "multipart field '{}' is missing",
        UPLOAD_FIELD
    )))
}

/// PNG of a recently classified image
pub async fn prediction_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let png = state
        .recent
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("no recent image for {}", id)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "private, max-age=3600"),
        ],
        png,
    )
        .into_response())
}

/// Prometheus exposition
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Service(#[from] Error),

    #[error("{message}")]
    Upload { status: StatusCode, message: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Service(e) => status_for(e.kind()),
            AppError::Upload { status, .. } => *status,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Service(e) => e.kind().as_str(),
            AppError::Upload { .. } | AppError::BadRequest(_) => "invalid_request",
            AppError::NotFound(_) => "not_found",
            AppError::Timeout(_) => "timeout",
            AppError::Internal(_) => "internal",
        }
    }
}

/// Status code for a service error
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ImageDecode | ErrorKind::ImageConversion => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Download | ErrorKind::ModelLoad => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Inference | ErrorKind::Config | ErrorKind::Io => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Turn errors raised by middleware into the JSON error envelope
pub fn middleware_error(err: BoxError, timeout: Duration) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::Timeout(timeout)
    } else {
        AppError::Internal(err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Upload {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();

        metrics::counter!("snaplabel_errors_total", "kind" => kind).increment(1);
        match &self {
            AppError::Service(e) if !e.kind().is_request_scoped() => {
                error!(kind, "Model unavailable: {}", e)
            }
            _ => warn!(kind, status = status.as_u16(), "Request failed: {}", self),
        }

        let body = json!({
            "error": {
                "kind": kind,
                "message": self.to_string(),
            }
        });

        (status, Json(body)).into_response()
    }
}
