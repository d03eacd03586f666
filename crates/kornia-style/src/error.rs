/// An error type for the style transfer pipeline.
#[derive(thiserror::Error, Debug)]
pub enum StyleTransferError {
    /// Error coming from the tensor engine.
    #[error(transparent)]
    CandleError(#[from] candle_core::Error),

    /// Error when downloading the pretrained weights.
    #[error(transparent)]
    FailedToLoadModel(#[from] hf_hub::api::sync::ApiError),

    /// Error to decode or encode an image.
    #[error("Failed to decode or encode the image. {0}")]
    ImageError(#[from] image::ImageError),

    /// Error to manipulate a file.
    #[error("Failed to manipulate the file. {0}")]
    IoError(#[from] std::io::Error),

    /// Error to parse the configuration file.
    #[error("Failed to parse the configuration. {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Error when an input file does not exist.
    #[error("File does not exist: {0}")]
    FileDoesNotExist(std::path::PathBuf),

    /// Error when the pretrained weights file does not exist.
    #[error("Pretrained weights not found: {0}")]
    WeightsNotFound(std::path::PathBuf),

    /// Error when a requested compute device cannot be opened.
    #[error("Compute device {0} is not available: {1}")]
    DeviceUnavailable(String, String),

    /// Error when a safetensors file does not hold the expected tensor.
    #[error("Tensor '{0}' not found in {1}")]
    MissingTensor(String, std::path::PathBuf),

    /// Error when a tensor lives on a different device than the pipeline.
    #[error("Tensor '{0}' is not on the compute device {1}")]
    DeviceMismatch(&'static str, String),

    /// Error when two tensors that must be paired have different shapes.
    #[error("Shape mismatch for {0}: {1:?} != {2:?}")]
    ShapeMismatch(&'static str, Vec<usize>, Vec<usize>),

    /// Error when the feature sets do not have the same length.
    #[error("Feature count mismatch: generated = {generated}, content = {content}, style = {style}")]
    FeatureCountMismatch {
        generated: usize,
        content: usize,
        style: usize,
    },

    /// Error when a loss is requested over no features at all.
    #[error("Cannot compute a loss over an empty feature set")]
    EmptyFeatureSet,

    /// Error when the input image does not have three channels.
    #[error("Expected an image tensor with 3 channels, got {0}")]
    ChannelMismatch(usize),

    /// Error when a tensor does not have the expected rank.
    #[error("Expected a tensor of rank {0}, got shape {1:?}")]
    InvalidTensorRank(usize, Vec<usize>),

    /// Error when a feature map does not have a batch size of one.
    #[error("Expected a batch size of 1, got {0}")]
    BatchSizeNotOne(usize),

    /// Error when a captured layer index is outside the backbone.
    #[error("Invalid layer index {0}: the backbone has {1} layers")]
    InvalidLayerIndex(usize, usize),

    /// Error when a configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
