use std::{fmt, path::Path, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::StyleTransferError;

/// The compute device requested for a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSelection {
    /// Pick the fastest available device: CUDA, then Metal, then CPU.
    #[default]
    Auto,
    /// Always run on the CPU.
    Cpu,
    /// Run on the CUDA device with the given ordinal.
    Cuda(usize),
    /// Run on the Metal device with the given ordinal.
    Metal(usize),
}

impl fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelection::Auto => write!(f, "auto"),
            DeviceSelection::Cpu => write!(f, "cpu"),
            DeviceSelection::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
            DeviceSelection::Metal(ordinal) => write!(f, "metal:{ordinal}"),
        }
    }
}

impl FromStr for DeviceSelection {
    type Err = StyleTransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (name, ordinal) = match s.split_once(':') {
            Some((name, ordinal)) => {
                let ordinal = ordinal.parse::<usize>().map_err(|_| {
                    StyleTransferError::InvalidConfig(format!("invalid device ordinal in '{s}'"))
                })?;
                (name, Some(ordinal))
            }
            None => (s.as_str(), None),
        };

        match (name, ordinal) {
            ("auto", None) => Ok(DeviceSelection::Auto),
            ("cpu", None) => Ok(DeviceSelection::Cpu),
            ("cuda", ordinal) => Ok(DeviceSelection::Cuda(ordinal.unwrap_or(0))),
            ("metal", ordinal) => Ok(DeviceSelection::Metal(ordinal.unwrap_or(0))),
            _ => Err(StyleTransferError::InvalidConfig(format!(
                "unknown device '{s}', expected auto, cpu, cuda[:N] or metal[:N]"
            ))),
        }
    }
}

/// Configuration for a style transfer run.
///
/// Every field has a default so that a JSON file only needs to list the
/// values it wants to change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleTransferConfig {
    /// Path to the content image.
    pub content_path: PathBuf,
    /// Path to the style image.
    pub style_path: PathBuf,
    /// Path of the viewable snapshot, overwritten every `snapshot_interval` steps.
    pub snapshot_path: PathBuf,
    /// Path of the final raw tensor, written as safetensors.
    pub output_path: PathBuf,
    /// Side of the square resolution both images are resized to.
    pub image_size: usize,
    /// Backbone layer indices whose activations are captured.
    pub layers: Vec<usize>,
    /// Number of optimization steps.
    pub total_steps: usize,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Weight of the content loss.
    pub alpha: f64,
    /// Weight of the style loss.
    pub beta: f64,
    /// Report progress and write a snapshot every this many steps.
    pub snapshot_interval: usize,
    /// Compute device selection.
    pub device: DeviceSelection,
    /// Local VGG19 safetensors weights. Downloaded from the hub when unset.
    pub weights_path: Option<PathBuf>,
    /// Safetensors file from a previous run to start from instead of the content image.
    pub init_path: Option<PathBuf>,
}

impl Default for StyleTransferConfig {
    fn default() -> Self {
        Self {
            content_path: PathBuf::from("content.jpg"),
            style_path: PathBuf::from("style.jpg"),
            snapshot_path: PathBuf::from("generated.png"),
            output_path: PathBuf::from("generated.safetensors"),
            image_size: 356,
            layers: vec![0, 5, 10, 19, 28],
            total_steps: 6000,
            learning_rate: 0.001,
            alpha: 1.0,
            beta: 0.01,
            snapshot_interval: 200,
            device: DeviceSelection::Auto,
            weights_path: None,
            init_path: None,
        }
    }
}

impl StyleTransferConfig {
    /// Read a configuration from a JSON file. Missing fields take their default value.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StyleTransferError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StyleTransferError::FileDoesNotExist(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the numeric parameters describe a runnable optimization.
    pub fn validate(&self) -> Result<(), StyleTransferError> {
        if self.image_size == 0 {
            return Err(StyleTransferError::InvalidConfig(
                "image_size must be greater than zero".to_string(),
            ));
        }
        if self.layers.is_empty() {
            return Err(StyleTransferError::InvalidConfig(
                "at least one backbone layer must be captured".to_string(),
            ));
        }
        if self.snapshot_interval == 0 {
            return Err(StyleTransferError::InvalidConfig(
                "snapshot_interval must be greater than zero".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(StyleTransferError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (name, weight) in [("alpha", self.alpha), ("beta", self.beta)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(StyleTransferError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {weight}"
                )));
            }
        }
        Ok(())
    }
}
