use std::path::PathBuf;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, VarBuilder};

use crate::error::StyleTransferError;

/// Extracts an ordered set of activations from an image tensor.
///
/// Implementations must be pure: the same input always yields the same features,
/// and nothing inside the extractor is updated by the optimization.
pub trait FeatureExtractor {
    /// Run the image through the backbone and return the captured activations
    /// in ascending layer order.
    fn extract(&self, image: &Tensor) -> Result<Vec<Tensor>, StyleTransferError>;

    /// Number of activations returned by [`FeatureExtractor::extract`].
    fn num_features(&self) -> usize;
}

/// One stage of a VGG layer plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VggStage {
    /// A 3x3 convolution with the given output channels, followed by a ReLU.
    Conv(usize),
    /// A 2x2 max pooling with stride 2.
    MaxPool,
}

/// Layer plan of a VGG `features` block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VggConfig {
    pub in_channels: usize,
    pub stages: Vec<VggStage>,
}

impl VggConfig {
    /// The VGG19 plan, 37 layers.
    #[rustfmt::skip]
    pub fn vgg19() -> Self {
        use VggStage::{Conv, MaxPool};
        Self {
            in_channels: 3,
            stages: vec![
                Conv(64), Conv(64), MaxPool,
                Conv(128), Conv(128), MaxPool,
                Conv(256), Conv(256), Conv(256), Conv(256), MaxPool,
                Conv(512), Conv(512), Conv(512), Conv(512), MaxPool,
                Conv(512), Conv(512), Conv(512), Conv(512), MaxPool,
            ],
        }
    }

    /// Number of layers in the plan, counting each ReLU as its own layer.
    pub fn num_layers(&self) -> usize {
        self.stages
            .iter()
            .map(|stage| match stage {
                VggStage::Conv(_) => 2,
                VggStage::MaxPool => 1,
            })
            .sum()
    }
}

enum VggLayer {
    Conv(Conv2d),
    Relu,
    MaxPool,
}

impl VggLayer {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            VggLayer::Conv(conv) => conv.forward(xs),
            VggLayer::Relu => xs.relu(),
            VggLayer::MaxPool => xs.max_pool2d(2),
        }
    }
}

/// A VGG convolutional backbone truncated after the last captured layer.
///
/// The weights are loaded as plain tensors, so the backbone has no trainable
/// parameters and gradients only reach the input image.
pub struct Vgg {
    layers: Vec<VggLayer>,
    capture: Vec<usize>,
    in_channels: usize,
}

impl Vgg {
    // hub repository holding the torchvision VGG19 weights in safetensors format
    const MODEL_IDENTIFIER: &'static str = "timm/vgg19.tv_in1k";
    const MODEL_FILENAME: &'static str = "model.safetensors";

    /// Build the backbone from a layer plan.
    ///
    /// # Arguments
    ///
    /// * `config` - The layer plan.
    /// * `capture` - Indices of the layers whose output is captured, counted from the input.
    /// * `vb` - Weights, looked up as `{index}.weight` and `{index}.bias`.
    pub fn new(
        config: &VggConfig,
        capture: &[usize],
        vb: VarBuilder,
    ) -> Result<Self, StyleTransferError> {
        let num_layers = config.num_layers();

        let mut capture = capture.to_vec();
        capture.sort_unstable();
        capture.dedup();

        let last = match capture.last() {
            Some(&last) if last < num_layers => last,
            Some(&last) => return Err(StyleTransferError::InvalidLayerIndex(last, num_layers)),
            None => {
                return Err(StyleTransferError::InvalidConfig(
                    "at least one backbone layer must be captured".to_string(),
                ))
            }
        };

        let conv_config = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };

        let mut layers = Vec::with_capacity(last + 1);
        let mut channels = config.in_channels;
        for stage in config.stages.iter() {
            if layers.len() > last {
                break;
            }
            match *stage {
                VggStage::Conv(out_channels) => {
                    let index = layers.len();
                    let conv =
                        candle_nn::conv2d(channels, out_channels, 3, conv_config, vb.pp(index))?;
                    layers.push(VggLayer::Conv(conv));
                    layers.push(VggLayer::Relu);
                    channels = out_channels;
                }
                VggStage::MaxPool => layers.push(VggLayer::MaxPool),
            }
        }
        // a conv stage pushes two layers at once
        layers.truncate(last + 1);

        log::debug!(
            "Built VGG backbone with {} layers, capturing {:?}",
            layers.len(),
            capture
        );

        Ok(Self {
            layers,
            capture,
            in_channels: config.in_channels,
        })
    }

    /// Load the pretrained VGG19 backbone.
    ///
    /// The weights are read from `weights` when given, otherwise they are
    /// downloaded from the Hugging Face hub.
    pub fn vgg19(
        capture: &[usize],
        weights: Option<PathBuf>,
        device: &Device,
    ) -> Result<Self, StyleTransferError> {
        let weights_file = match weights {
            None => {
                log::debug!("Loading VGG19 from HuggingFace Hub: {}", Self::MODEL_IDENTIFIER);
                let api = hf_hub::api::sync::Api::new()?;
                let repo = api.model(Self::MODEL_IDENTIFIER.to_string());
                repo.get(Self::MODEL_FILENAME)?
            }
            Some(path) => {
                if !path.exists() {
                    return Err(StyleTransferError::WeightsNotFound(path));
                }
                log::debug!("Loading VGG19 from local weights: {}", path.display());
                path
            }
        };

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_file], DType::F32, device)? };

        Self::new(&VggConfig::vgg19(), capture, vb.pp("features"))
    }

    /// Number of layers kept after truncation.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// The sorted layer indices whose activations are captured.
    pub fn capture(&self) -> &[usize] {
        &self.capture
    }
}

impl FeatureExtractor for Vgg {
    fn extract(&self, image: &Tensor) -> Result<Vec<Tensor>, StyleTransferError> {
        if image.rank() != 4 {
            return Err(StyleTransferError::InvalidTensorRank(
                4,
                image.dims().to_vec(),
            ));
        }
        let channels = image.dim(1)?;
        if channels != self.in_channels {
            return Err(StyleTransferError::ChannelMismatch(channels));
        }

        let mut features = Vec::with_capacity(self.capture.len());
        let mut captures = self.capture.iter().peekable();
        let mut xs = image.clone();
        for (index, layer) in self.layers.iter().enumerate() {
            xs = layer.forward(&xs)?;
            if captures.next_if_eq(&&index).is_some() {
                features.push(xs.clone());
            }
        }

        Ok(features)
    }

    fn num_features(&self) -> usize {
        self.capture.len()
    }
}
