use std::fmt;

use candle_core::{Device, Tensor};

use crate::{
    config::StyleTransferConfig,
    device::{ensure_same_device, resolve_device},
    error::StyleTransferError,
    features::{FeatureExtractor, Vgg},
    loss::{LossComputer, Losses},
    optim::PixelOptimizer,
    preprocess::{load_tensor, save_tensor, Preprocessor},
};

/// Progress of a run, reported every `snapshot_interval` steps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Progress {
    /// Zero-based index of the step that produced `loss`.
    pub step: usize,
    pub total_steps: usize,
    /// Total loss evaluated before the update of this step.
    pub loss: f32,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Step [{}/{}], Loss: {:.4}",
            self.step, self.total_steps, self.loss
        )
    }
}

/// Summary of a finished run.
#[derive(Debug)]
pub struct TransferOutput {
    /// The final generated tensor, still normalized, shape `(1, 3, H, W)`.
    pub generated: Tensor,
    pub steps: usize,
    pub snapshots_written: usize,
    /// Snapshots that could not be written. These do not stop the run.
    pub snapshot_failures: usize,
    /// Total loss of the last step, `None` when no step ran.
    pub final_loss: Option<f32>,
}

/// Optimizes the pixels of an image so that it keeps the structure of the
/// content image and the feature statistics of the style image.
///
/// # Example
///
/// ```no_run
/// use kornia_style::{StyleTransfer, StyleTransferConfig};
///
/// let config = StyleTransferConfig {
///     content_path: "content.jpg".into(),
///     style_path: "style.jpg".into(),
///     total_steps: 1000,
///     ..Default::default()
/// };
///
/// let mut transfer = StyleTransfer::new(config).unwrap();
/// let output = transfer.run().unwrap();
/// assert_eq!(output.generated.dims()[1], 3);
/// ```
pub struct StyleTransfer<E: FeatureExtractor = Vgg> {
    config: StyleTransferConfig,
    device: Device,
    extractor: E,
    preprocessor: Preprocessor,
    loss: LossComputer,
    content: Tensor,
    style: Tensor,
    // content and style never change, so their features are computed once
    content_features: Vec<Tensor>,
    style_features: Vec<Tensor>,
    optimizer: PixelOptimizer,
}

impl StyleTransfer<Vgg> {
    /// Create a run from a configuration.
    ///
    /// Resolves the compute device, loads and normalizes both images and loads
    /// the pretrained VGG19 backbone.
    pub fn new(config: StyleTransferConfig) -> Result<Self, StyleTransferError> {
        config.validate()?;

        let device = resolve_device(config.device)?;
        let preprocessor = Preprocessor::new(config.image_size, &device)?;

        let content = preprocessor.load_image(&config.content_path)?;
        let style = preprocessor.load_image(&config.style_path)?;

        let extractor = Vgg::vgg19(&config.layers, config.weights_path.clone(), &device)?;

        Self::with_extractor(config, extractor, content, style, &device)
    }
}

impl<E: FeatureExtractor> StyleTransfer<E> {
    /// Create a run from a feature extractor and already normalized image tensors.
    ///
    /// # Arguments
    ///
    /// * `config` - The run configuration. Image paths, `layers` and `weights_path` are not used.
    /// * `extractor` - The frozen feature extractor.
    /// * `content` - The normalized content image with shape `(1, 3, H, W)`.
    /// * `style` - The normalized style image, same shape as `content`.
    /// * `device` - The device every tensor must live on.
    pub fn with_extractor(
        config: StyleTransferConfig,
        extractor: E,
        content: Tensor,
        style: Tensor,
        device: &Device,
    ) -> Result<Self, StyleTransferError> {
        config.validate()?;

        if content.rank() != 4 {
            return Err(StyleTransferError::InvalidTensorRank(
                4,
                content.dims().to_vec(),
            ));
        }
        let (b, c, _, _) = content.dims4()?;
        if b != 1 {
            return Err(StyleTransferError::BatchSizeNotOne(b));
        }
        if c != 3 {
            return Err(StyleTransferError::ChannelMismatch(c));
        }
        if style.dims() != content.dims() {
            return Err(StyleTransferError::ShapeMismatch(
                "style image",
                style.dims().to_vec(),
                content.dims().to_vec(),
            ));
        }
        ensure_same_device("content", &content, device)?;
        ensure_same_device("style", &style, device)?;

        let init = match &config.init_path {
            Some(path) => {
                let init = load_tensor(path, device)?;
                if init.dims() != content.dims() {
                    return Err(StyleTransferError::ShapeMismatch(
                        "resumed image",
                        init.dims().to_vec(),
                        content.dims().to_vec(),
                    ));
                }
                log::debug!("Resuming from {}", path.display());
                init
            }
            None => content.clone(),
        };

        let content_features = extractor.extract(&content)?;
        let style_features = extractor.extract(&style)?;

        let optimizer = PixelOptimizer::new(&init, config.learning_rate)?;
        let preprocessor = Preprocessor::new(config.image_size, device)?;
        let loss = LossComputer::new(config.alpha, config.beta);

        log::debug!(
            "Style transfer ready: image {:?}, {} features, {} steps",
            content.dims(),
            content_features.len(),
            config.total_steps
        );

        Ok(Self {
            config,
            device: device.clone(),
            extractor,
            preprocessor,
            loss,
            content,
            style,
            content_features,
            style_features,
            optimizer,
        })
    }

    pub fn config(&self) -> &StyleTransferConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn content(&self) -> &Tensor {
        &self.content
    }

    pub fn style(&self) -> &Tensor {
        &self.style
    }

    /// The current generated image, normalized.
    pub fn generated(&self) -> &Tensor {
        self.optimizer.image()
    }

    /// Number of optimizer updates applied so far.
    pub fn steps_done(&self) -> usize {
        self.optimizer.steps()
    }

    /// Compute the losses of the current generated image without updating it.
    pub fn evaluate(&self) -> Result<Losses, StyleTransferError> {
        let generated_features = self.extractor.extract(self.optimizer.image())?;
        self.loss.compute(
            &generated_features,
            &self.content_features,
            &self.style_features,
        )
    }

    /// Run one iteration: evaluate, backpropagate and apply one Adam update.
    ///
    /// Returns the total loss evaluated before the update.
    pub fn step(&mut self) -> Result<f32, StyleTransferError> {
        let losses = self.evaluate()?;
        let total = losses.total.to_scalar::<f32>()?;
        self.optimizer.step(&losses.total)?;
        Ok(total)
    }

    /// Run the whole optimization, printing a progress line to stdout every
    /// `snapshot_interval` steps.
    pub fn run(&mut self) -> Result<TransferOutput, StyleTransferError> {
        self.run_with(|progress| println!("{progress}"))
    }

    /// Run the whole optimization, calling `on_progress` every `snapshot_interval` steps.
    ///
    /// A snapshot of the generated image is written to `snapshot_path` at the same
    /// steps; a failed snapshot is logged and the run continues. The final tensor is
    /// written to `output_path` and a failure there is returned as an error.
    pub fn run_with<F>(&mut self, mut on_progress: F) -> Result<TransferOutput, StyleTransferError>
    where
        F: FnMut(&Progress),
    {
        let total_steps = self.config.total_steps;
        let interval = self.config.snapshot_interval;

        let mut snapshots_written = 0;
        let mut snapshot_failures = 0;
        let mut final_loss = None;

        for step in 0..total_steps {
            let loss = self.step()?;
            final_loss = Some(loss);

            if step % interval == 0 {
                let progress = Progress {
                    step,
                    total_steps,
                    loss,
                };
                log::debug!("{progress}");
                on_progress(&progress);

                match self
                    .preprocessor
                    .save_snapshot(self.optimizer.image(), &self.config.snapshot_path)
                {
                    Ok(()) => snapshots_written += 1,
                    Err(e) => {
                        log::error!(
                            "Failed to write the snapshot {}: {e}",
                            self.config.snapshot_path.display()
                        );
                        snapshot_failures += 1;
                    }
                }
            }
        }

        save_tensor(self.optimizer.image(), &self.config.output_path)?;
        log::debug!(
            "Wrote the generated tensor to {}",
            self.config.output_path.display()
        );

        Ok(TransferOutput {
            generated: self.optimizer.image().detach(),
            steps: total_steps,
            snapshots_written,
            snapshot_failures,
            final_loss,
        })
    }
}
