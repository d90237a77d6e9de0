//! Network construction from artifact weights

use crate::artifact::{Architecture, ArtifactManifest};
use candle_core::{Module, Tensor, D};
use candle_nn::{Conv2d, Conv2dConfig, Linear, VarBuilder};
use candle_transformers::models::resnet;

/// A network ready for forward passes, shareable across threads
pub type Network = Box<dyn Module + Send + Sync>;

/// Stack of 3x3 conv blocks followed by global average pooling and a linear head.
///
/// Weight names: `features.{i}.weight`, `features.{i}.bias`, `head.weight`,
/// `head.bias`. Each block is conv, ReLU, 2x2 max-pool.
pub struct ConvNet {
    features: Vec<Conv2d>,
    head: Linear,
}

impl ConvNet {
    pub fn new(channels: &[usize], num_classes: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let config = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };

        let mut in_channels = 3;
        let mut features = Vec::with_capacity(channels.len());
        for (i, &out_channels) in channels.iter().enumerate() {
            features.push(candle_nn::conv2d(
                in_channels,
                out_channels,
                3,
                config,
                vb.pp(format!("features.{i}")),
            )?);
            in_channels = out_channels;
        }

        let head = candle_nn::linear(in_channels, num_classes, vb.pp("head"))?;
        Ok(Self { features, head })
    }
}

impl Module for ConvNet {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut xs = xs.clone();
        for conv in &self.features {
            xs = conv.forward(&xs)?.relu()?.max_pool2d(2)?;
        }
        // (B, C, H, W) -> (B, C)
        let pooled = xs.mean(D::Minus1)?.mean(D::Minus1)?;
        self.head.forward(&pooled)
    }
}

/// Build the network an artifact describes.
///
/// Fails if a weight is missing or has the wrong shape.
pub fn build(manifest: &ArtifactManifest, vb: VarBuilder<'static>) -> candle_core::Result<Network> {
    let num_classes = manifest.labels.len();
    let network: Network = match manifest.architecture {
        Architecture::ConvNet => Box::new(ConvNet::new(&manifest.channels, num_classes, vb)?),
        Architecture::ResNet18 => Box::new(resnet::resnet18(num_classes, vb)?),
        Architecture::ResNet34 => Box::new(resnet::resnet34(num_classes, vb)?),
        Architecture::ResNet50 => Box::new(resnet::resnet50(num_classes, vb)?),
    };
    Ok(network)
}
