//! Error types for snaplabel

use serde::Serialize;

/// Result type alias using snaplabel's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for snaplabel operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The model artifact could not be fetched
    #[error("download failed: {0}")]
    Download(String),

    /// The cached artifact could not be turned into a predictor
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// Uploaded bytes are corrupt or in an unsupported format
    #[error("image decode failed: {0}")]
    ImageDecode(String),

    /// A decoded image could not be turned into model input
    #[error("image conversion failed: {0}")]
    ImageConversion(String),

    /// The predictor failed or returned an unusable output
    #[error("inference failed: {0}")]
    Inference(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new download error
    pub fn download(msg: impl Into<String>) -> Self {
        Self::Download(msg.into())
    }

    /// Create a new model load error
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new image decode error
    pub fn image_decode(msg: impl Into<String>) -> Self {
        Self::ImageDecode(msg.into())
    }

    /// Create a new image conversion error
    pub fn image_conversion(msg: impl Into<String>) -> Self {
        Self::ImageConversion(msg.into())
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Coarse classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Download(_) => ErrorKind::Download,
            Self::ModelLoad(_) => ErrorKind::ModelLoad,
            Self::ImageDecode(_) => ErrorKind::ImageDecode,
            Self::ImageConversion(_) => ErrorKind::ImageConversion,
            Self::Inference(_) => ErrorKind::Inference,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Error category, used for metric labels and HTTP status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Download,
    ModelLoad,
    ImageDecode,
    ImageConversion,
    Inference,
    Config,
    Io,
}

impl ErrorKind {
    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::ModelLoad => "model_load",
            Self::ImageDecode => "image_decode",
            Self::ImageConversion => "image_conversion",
            Self::Inference => "inference",
            Self::Config => "config",
            Self::Io => "io",
        }
    }

    /// Whether the failure belongs to a single request.
    ///
    /// Everything else means the predictor is unavailable and the service
    /// is not ready.
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            Self::ImageDecode | Self::ImageConversion | Self::Inference
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
