//! Inference pipeline: preprocessing, prediction, result normalization

use crate::predictor::{Predictor, PredictorLoader};
use crate::preprocess::{preprocess, InputImage};
use snaplabel_core::{ClassId, Error, ErrorKind, PredictionResult, Result, Vocabulary};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of one successful request
#[derive(Debug, Clone)]
pub struct Prediction {
    /// The normalized image the predictor saw
    pub image: InputImage,

    /// Validated prediction
    pub result: PredictionResult,

    /// Time spent inside the predictor
    pub inference_time: Duration,
}

/// Runs uploads through a loaded predictor.
///
/// Stateless apart from the shared predictor: a failed request leaves nothing
/// behind that could influence the next one.
pub struct InferencePipeline {
    predictor: Arc<dyn Predictor>,
}

impl InferencePipeline {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        Self { predictor }
    }

    /// Load the artifact at `path` with `loader`
    pub fn load(path: &Path, loader: &dyn PredictorLoader) -> Result<Self> {
        Ok(Self::new(loader.load(path)?))
    }

    pub fn predictor(&self) -> &Arc<dyn Predictor> {
        &self.predictor
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        self.predictor.vocabulary()
    }

    /// Classify raw upload bytes
    pub fn predict(&self, bytes: &[u8]) -> Result<Prediction> {
        let image = preprocess(bytes)?;
        self.predict_image(image)
    }

    /// Classify an already normalized image
    pub fn predict_image(&self, image: InputImage) -> Result<Prediction> {
        let started = Instant::now();
        let raw = self
            .predictor
            .predict(image.rgb())
            .map_err(as_inference_error)?;
        let inference_time = started.elapsed();

        let vocabulary = Arc::clone(self.predictor.vocabulary());
        match vocabulary.get(ClassId::new(raw.index)) {
            Some(label) if label == raw.label => {}
            Some(label) => {
                return Err(Error::inference(format!(
                    "predictor chose '{}' but index {} is '{}'",
                    raw.label, raw.index, label
                )))
            }
            None => {
                return Err(Error::inference(format!(
                    "predictor chose index {} outside the vocabulary",
                    raw.index
                )))
            }
        }

        let result = PredictionResult::new(vocabulary, ClassId::new(raw.index), raw.probabilities)?;

        debug!(
            label = result.label(),
            confidence = result.confidence(),
            inference_us = inference_time.as_micros() as u64,
            "Prediction complete"
        );

        Ok(Prediction {
            image,
            result,
            inference_time,
        })
    }
}

/// Keep conversion errors, report anything else as an inference failure
fn as_inference_error(err: Error) -> Error {
    match err.kind() {
        ErrorKind::ImageConversion | ErrorKind::Inference => err,
        _ => Error::inference(err.to_string()),
    }
}
