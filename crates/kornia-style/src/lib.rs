//! # Kornia Style Transfer
//!
//! Neural style transfer with a frozen, pretrained VGG19 backbone.
//!
//! The pixels of the generated image are the only optimization variable. Every
//! iteration extracts the backbone activations of the generated image, compares
//! them with the activations of the content image (content loss) and with the
//! Gram matrices of the style image activations (style loss), and applies one
//! Adam update to the image.

/// Run configuration.
pub mod config;

/// Compute device selection.
pub mod device;

/// Error types for the style transfer pipeline.
pub mod error;

/// Frozen feature extractors.
pub mod features;

/// Content and style losses.
pub mod loss;

/// Adam updates on the generated image.
pub mod optim;

/// Image loading, normalization and persistence.
pub mod preprocess;

/// The optimization driver.
pub mod transfer;

pub use crate::config::{DeviceSelection, StyleTransferConfig};
pub use crate::error::StyleTransferError;
pub use crate::features::{FeatureExtractor, Vgg, VggConfig, VggStage};
pub use crate::loss::{LossComputer, Losses};
pub use crate::transfer::{Progress, StyleTransfer, TransferOutput};
