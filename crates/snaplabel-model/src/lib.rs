//! snaplabel Model
//!
//! Everything between "a remote model identifier" and "a validated prediction":
//!
//! - [`fetcher`]: download-once artifact cache
//! - [`artifact`]: the safetensors artifact format and its manifest
//! - [`network`] / [`predictor`]: Candle networks behind the [`Predictor`] trait
//! - [`preprocess`]: decode, orientation correction, RGB conversion
//! - [`pipeline`]: preprocessing + prediction + result normalization
//! - [`service`]: the process-wide, built-at-most-once pipeline
//!
//! Inference always runs on the CPU.

pub mod artifact;
pub mod config;
pub mod fetcher;
pub mod network;
pub mod pipeline;
pub mod predictor;
pub mod preprocess;
pub mod service;
pub mod source;

pub use artifact::{
    read_artifact, save_artifact, write_color_demo, Architecture, ArtifactManifest, FORMAT_TAG,
};
pub use config::{ModelSettings, SourceSpec};
pub use fetcher::ArtifactFetcher;
pub use pipeline::{InferencePipeline, Prediction};
pub use predictor::{CandleLoader, CandlePredictor, Predictor, PredictorLoader, RawPrediction};
pub use preprocess::{preprocess, InputImage, SUPPORTED_FORMATS};
pub use service::{LoadedModel, ModelService};
pub use source::{ArtifactSource, HttpSource};

#[cfg(feature = "hf-hub-source")]
pub use source::HuggingFaceSource;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::fetcher::ArtifactFetcher;
    pub use crate::pipeline::{InferencePipeline, Prediction};
    pub use crate::predictor::{Predictor, PredictorLoader, RawPrediction};
    pub use crate::service::ModelService;
    pub use snaplabel_core::prelude::*;
}
