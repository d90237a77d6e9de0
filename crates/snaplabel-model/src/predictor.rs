//! Predictor trait and the Candle implementation

use crate::artifact::{read_artifact, ArtifactManifest};
use crate::network::{self, Network};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::VarBuilder;
use image::imageops::FilterType;
use image::RgbImage;
use snaplabel_core::{ClassId, Error, Result, Vocabulary};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Raw predictor output, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    /// Chosen label
    pub label: String,

    /// Index of `label` in the vocabulary
    pub index: usize,

    /// One probability per vocabulary entry
    pub probabilities: Vec<f32>,
}

/// A loaded classifier.
///
/// Implementations hold only immutable weights, so one instance serves any
/// number of concurrent callers.
pub trait Predictor: Send + Sync {
    /// Short description of the model, e.g. its architecture
    fn name(&self) -> &str;

    /// Labels the predictor can output, fixed at load time
    fn vocabulary(&self) -> &Arc<Vocabulary>;

    /// Classify an upright RGB image
    fn predict(&self, image: &RgbImage) -> Result<RawPrediction>;
}

/// Turns a cached artifact into a [`Predictor`]
pub trait PredictorLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Predictor>>;
}

/// Loads artifacts with [`CandlePredictor::load`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CandleLoader;

impl PredictorLoader for CandleLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Predictor>> {
        Ok(Arc::new(CandlePredictor::load(path)?))
    }
}

/// Candle network built from an artifact, running on the CPU
pub struct CandlePredictor {
    manifest: ArtifactManifest,
    vocabulary: Arc<Vocabulary>,
    network: Network,
    device: Device,
    mean: Tensor,
    std: Tensor,
}

impl std::fmt::Debug for CandlePredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandlePredictor")
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

impl CandlePredictor {
    /// Load an artifact from disk.
    ///
    /// Always targets the CPU, whatever hardware the weights were trained on.
    pub fn load(path: &Path) -> Result<Self> {
        let (manifest, bytes) = read_artifact(path)?;
        let device = Device::Cpu;

        let vb = VarBuilder::from_buffered_safetensors(bytes, DType::F32, &device)
            .map_err(|e| Error::model_load(format!("Failed to read weights: {}", e)))?;
        let network = network::build(&manifest, vb).map_err(|e| {
            Error::model_load(format!(
                "weights in {} do not match a {} with {} classes: {}",
                path.display(),
                manifest.architecture,
                manifest.labels.len(),
                e
            ))
        })?;

        let mean = Tensor::from_slice(manifest.mean.as_slice(), (3, 1, 1), &device)
            .map_err(|e| Error::model_load(e.to_string()))?;
        let std = Tensor::from_slice(manifest.std.as_slice(), (3, 1, 1), &device)
            .map_err(|e| Error::model_load(e.to_string()))?;

        let vocabulary = Arc::new(manifest.vocabulary()?);

        info!(
            path = %path.display(),
            architecture = %manifest.architecture,
            classes = vocabulary.len(),
            "Model loaded on CPU"
        );

        Ok(Self {
            manifest,
            vocabulary,
            network,
            device,
            mean,
            std,
        })
    }

    pub fn manifest(&self) -> &ArtifactManifest {
        &self.manifest
    }

    /// Resize and normalize into a `(1, 3, S, S)` tensor
    fn to_input(&self, image: &RgbImage) -> Result<Tensor> {
        let side = self.manifest.image_size as u32;
        let convert = |e: candle_core::Error| Error::image_conversion(e.to_string());

        if image.width() == 0 || image.height() == 0 {
            return Err(Error::image_conversion("image has no pixels"));
        }

        let resized;
        let image = if image.dimensions() == (side, side) {
            image
        } else {
            resized = image::imageops::resize(image, side, side, FilterType::Triangle);
            &resized
        };

        let side = side as usize;
        Tensor::from_slice(image.as_raw().as_slice(), (side, side, 3), &self.device)
            .and_then(|t| t.permute((2, 0, 1)))
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.affine(1.0 / 255.0, 0.0))
            .and_then(|t| t.broadcast_sub(&self.mean))
            .and_then(|t| t.broadcast_div(&self.std))
            .and_then(|t| t.unsqueeze(0))
            .map_err(convert)
    }
}

impl Predictor for CandlePredictor {
    fn name(&self) -> &str {
        self.manifest.architecture.as_str()
    }

    fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocabulary
    }

    fn predict(&self, image: &RgbImage) -> Result<RawPrediction> {
        let input = self.to_input(image)?;

        let probabilities = self
            .network
            .forward(&input)
            .and_then(|logits| candle_nn::ops::softmax(&logits, D::Minus1))
            .and_then(|probs| probs.squeeze(0))
            .and_then(|probs| probs.to_vec1::<f32>())
            .map_err(|e| Error::inference(e.to_string()))?;

        // First maximum wins ties
        let index = probabilities
            .iter()
            .enumerate()
            .fold(0, |best, (i, p)| if *p > probabilities[best] { i } else { best });

        let label = self
            .vocabulary
            .get(ClassId::new(index))
            .ok_or_else(|| {
                Error::inference(format!(
                    "network produced {} outputs for {} classes",
                    probabilities.len(),
                    self.vocabulary.len()
                ))
            })?
            .to_string();

        Ok(RawPrediction {
            label,
            index,
            probabilities,
        })
    }
}
