//! Model artifact format
//!
//! An artifact is a single safetensors file. The weights are ordinary named
//! tensors; everything else needed to rebuild the predictor lives in the
//! safetensors `__metadata__` header:
//!
//! | key            | value                                              |
//! |----------------|----------------------------------------------------|
//! | `format`       | [`FORMAT_TAG`]                                     |
//! | `architecture` | `convnet`, `resnet18`, `resnet34` or `resnet50`    |
//! | `labels`       | JSON array of class labels, in output order        |
//! | `image_size`   | side of the square network input, in pixels        |
//! | `mean`, `std`  | JSON arrays of 3 floats, per-channel normalization |
//! | `channels`     | `convnet` only: JSON array of conv layer widths    |

use candle_core::Tensor;
use serde::{Deserialize, Serialize};
use snaplabel_core::{Error, Result, Vocabulary};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Value of the `format` metadata key
pub const FORMAT_TAG: &str = "snaplabel/1";

/// ImageNet channel statistics, used by the ResNet family
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Network family stored in an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// Small stack of 3x3 convolutions with a linear head
    ConvNet,
    ResNet18,
    ResNet34,
    ResNet50,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConvNet => "convnet",
            Self::ResNet18 => "resnet18",
            Self::ResNet34 => "resnet34",
            Self::ResNet50 => "resnet50",
        }
    }
}

impl FromStr for Architecture {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "convnet" => Ok(Self::ConvNet),
            "resnet18" => Ok(Self::ResNet18),
            "resnet34" => Ok(Self::ResNet34),
            "resnet50" => Ok(Self::ResNet50),
            other => Err(Error::model_load(format!(
                "unsupported architecture '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything in an artifact except the weights
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactManifest {
    pub architecture: Architecture,
    pub labels: Vec<String>,
    pub image_size: usize,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<usize>,
}

impl ArtifactManifest {
    /// Manifest for a `convnet` classifier
    pub fn convnet(labels: Vec<String>, channels: Vec<usize>, image_size: usize) -> Self {
        Self {
            architecture: Architecture::ConvNet,
            labels,
            image_size,
            mean: [0.0; 3],
            std: [1.0; 3],
            channels,
        }
    }

    /// Manifest for an ImageNet-style network (224px input, ImageNet statistics)
    pub fn imagenet(architecture: Architecture, labels: Vec<String>) -> Self {
        Self {
            architecture,
            labels,
            image_size: 224,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            channels: Vec::new(),
        }
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        // Label rules live in Vocabulary
        Vocabulary::new(self.labels.iter().cloned())?;

        if self.image_size == 0 {
            return Err(Error::model_load("image_size must be positive"));
        }
        if self.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(Error::model_load("std values must be positive"));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(Error::model_load("mean values must be finite"));
        }

        match self.architecture {
            Architecture::ConvNet => {
                if self.channels.iter().any(|c| *c == 0) {
                    return Err(Error::model_load("convnet channel widths must be positive"));
                }
                // Every conv block halves the input side
                let min_side = 1usize.checked_shl(self.channels.len() as u32).unwrap_or(usize::MAX);
                if self.image_size < min_side {
                    return Err(Error::model_load(format!(
                        "image_size {} is too small for {} pooling stages",
                        self.image_size,
                        self.channels.len()
                    )));
                }
            }
            _ => {
                if !self.channels.is_empty() {
                    return Err(Error::model_load(format!(
                        "'channels' is only meaningful for convnet, not {}",
                        self.architecture
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn vocabulary(&self) -> Result<Vocabulary> {
        Vocabulary::new(self.labels.iter().cloned())
    }

    /// Encode as safetensors header metadata
    pub fn to_metadata(&self) -> Result<HashMap<String, String>> {
        let mut metadata = HashMap::new();
        metadata.insert("format".to_string(), FORMAT_TAG.to_string());
        metadata.insert("architecture".to_string(), self.architecture.to_string());
        metadata.insert("labels".to_string(), to_json("labels", &self.labels)?);
        metadata.insert("image_size".to_string(), self.image_size.to_string());
        metadata.insert("mean".to_string(), to_json("mean", &self.mean)?);
        metadata.insert("std".to_string(), to_json("std", &self.std)?);
        if self.architecture == Architecture::ConvNet {
            metadata.insert("channels".to_string(), to_json("channels", &self.channels)?);
        }
        Ok(metadata)
    }

    /// Decode from safetensors header metadata
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Result<Self> {
        let field = |key: &str| metadata_field(metadata, key);

        let format = field("format")?;
        if format != FORMAT_TAG {
            return Err(Error::model_load(format!(
                "artifact format '{}' is not supported (expected '{}')",
                format, FORMAT_TAG
            )));
        }

        let architecture: Architecture = field("architecture")?.parse()?;
        let labels: Vec<String> = parse_json("labels", field("labels")?)?;
        let image_size = field("image_size")?.parse::<usize>().map_err(|e| {
            Error::model_load(format!("invalid image_size: {}", e))
        })?;
        let mean: [f32; 3] = parse_json("mean", field("mean")?)?;
        let std: [f32; 3] = parse_json("std", field("std")?)?;
        let channels: Vec<usize> = match metadata.get("channels") {
            Some(raw) => parse_json("channels", raw)?,
            None if architecture == Architecture::ConvNet => {
                return Err(Error::model_load("convnet artifact is missing 'channels'"))
            }
            None => Vec::new(),
        };

        let manifest = Self {
            architecture,
            labels,
            image_size,
            mean,
            std,
            channels,
        };
        manifest.validate()?;
        Ok(manifest)
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| Error::model_load(format!("invalid '{}' in artifact metadata: {}", key, e)))
}

fn metadata_field<'m>(metadata: &'m HashMap<String, String>, key: &str) -> Result<&'m str> {
    metadata
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::model_load(format!("artifact metadata is missing '{}'", key)))
}

fn to_json<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::config(format!("cannot encode '{}' for artifact metadata: {}", key, e)))
}

/// Read an artifact's manifest together with its raw bytes
pub fn read_artifact(path: &Path) -> Result<(ArtifactManifest, Vec<u8>)> {
    let bytes = std::fs::read(path).map_err(|e| {
        Error::model_load(format!("cannot read artifact {}: {}", path.display(), e))
    })?;

    let (_, header) = safetensors::SafeTensors::read_metadata(&bytes).map_err(|e| {
        Error::model_load(format!(
            "{} is not a valid safetensors artifact: {}",
            path.display(),
            e
        ))
    })?;

    let metadata = header.metadata().as_ref().ok_or_else(|| {
        Error::model_load(format!("{} carries no artifact metadata", path.display()))
    })?;

    let manifest = ArtifactManifest::from_metadata(metadata)?;
    Ok((manifest, bytes))
}

/// Write weights and manifest as an artifact
pub fn save_artifact(
    path: &Path,
    manifest: &ArtifactManifest,
    tensors: &HashMap<String, Tensor>,
) -> Result<()> {
    manifest.validate()?;
    let metadata = manifest.to_metadata()?;

    safetensors::serialize_to_file(
        tensors.iter().map(|(name, tensor)| (name.as_str(), tensor)),
        &Some(metadata),
        path,
    )
    .map_err(|e| Error::config(format!("cannot write artifact {}: {}", path.display(), e)))
}

/// Write a tiny `convnet` artifact that labels images by their dominant
/// primary color (`red`, `green`, `blue`).
///
/// The network has no conv blocks: the head sees the mean of each channel and
/// scores it with a scaled identity matrix.
pub fn write_color_demo(path: &Path) -> Result<ArtifactManifest> {
    let manifest = ArtifactManifest::convnet(
        vec!["red".to_string(), "green".to_string(), "blue".to_string()],
        Vec::new(),
        8,
    );

    let device = candle_core::Device::Cpu;
    let build = |e: candle_core::Error| Error::config(format!("cannot build demo weights: {}", e));
    #[rustfmt::skip]
    let weight = Tensor::from_slice(
        &[10.0f32, 0.0, 0.0,
          0.0, 10.0, 0.0,
          0.0, 0.0, 10.0],
        (3, 3),
        &device,
    )
    .map_err(build)?;
    let bias = Tensor::zeros(3, candle_core::DType::F32, &device).map_err(build)?;

    let tensors = HashMap::from([
        ("head.weight".to_string(), weight),
        ("head.bias".to_string(), bias),
    ]);
    save_artifact(path, &manifest, &tensors)?;
    Ok(manifest)
}
