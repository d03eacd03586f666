use std::{collections::HashMap, path::Path};

use candle_core::{DType, Device, Tensor};
use image::{imageops::FilterType, RgbImage};

use crate::error::StyleTransferError;

// ImageNet mean and std for normalization
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Key under which the generated tensor is stored in safetensors files.
pub const GENERATED_KEY: &str = "generated";

/// Converts images to normalized `(1, 3, S, S)` tensors and back.
pub struct Preprocessor {
    image_size: usize,
    mean: Tensor,
    std: Tensor,
    device: Device,
}

impl Preprocessor {
    /// Create a preprocessor that resizes every image to `image_size x image_size`.
    pub fn new(image_size: usize, device: &Device) -> Result<Self, StyleTransferError> {
        Ok(Self {
            image_size,
            mean: Tensor::from_slice(&MEAN, (1, 3, 1, 1), device)?,
            std: Tensor::from_slice(&STD, (1, 3, 1, 1), device)?,
            device: device.clone(),
        })
    }

    /// The side of the square images produced by this preprocessor.
    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Read an image from disk and convert it to a normalized tensor.
    pub fn load_image(&self, path: impl AsRef<Path>) -> Result<Tensor, StyleTransferError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StyleTransferError::FileDoesNotExist(path.to_path_buf()));
        }

        let image = image::open(path)?.to_rgb8();
        log::debug!(
            "Loaded {} with size {}x{}",
            path.display(),
            image.width(),
            image.height()
        );

        self.image_to_tensor(&image)
    }

    /// Resize an rgb8 image and convert it to a normalized tensor of shape `(1, 3, S, S)`.
    pub fn image_to_tensor(&self, image: &RgbImage) -> Result<Tensor, StyleTransferError> {
        let size = self.image_size;

        // bilinear resize to the square working resolution
        let resized = if image.width() as usize == size && image.height() as usize == size {
            image.clone()
        } else {
            image::imageops::resize(image, size as u32, size as u32, FilterType::Triangle)
        };

        // HWC u8 -> CHW f32 in [0, 1]
        let tensor = Tensor::from_vec(resized.into_raw(), (size, size, 3), &self.device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?;
        let tensor = (tensor / 255.0)?.unsqueeze(0)?;

        Ok(tensor
            .broadcast_sub(&self.mean)?
            .broadcast_div(&self.std)?)
    }

    /// Undo the mean/std normalization of a `(1, 3, H, W)` tensor.
    pub fn unnormalize(&self, tensor: &Tensor) -> Result<Tensor, StyleTransferError> {
        Ok(tensor
            .to_device(&self.device)?
            .broadcast_mul(&self.std)?
            .broadcast_add(&self.mean)?)
    }

    /// Convert a normalized `(1, 3, H, W)` tensor to a viewable rgb8 image.
    ///
    /// Values are clamped to the displayable range and rounded to the nearest integer.
    pub fn tensor_to_image(&self, tensor: &Tensor) -> Result<RgbImage, StyleTransferError> {
        let (b, c, h, w) = tensor.dims4()?;
        if b != 1 {
            return Err(StyleTransferError::BatchSizeNotOne(b));
        }
        if c != 3 {
            return Err(StyleTransferError::ChannelMismatch(c));
        }

        let data = self
            .unnormalize(&tensor.detach())?
            .clamp(0f32, 1f32)?
            .affine(255.0, 0.5)?
            .clamp(0f32, 255f32)?
            .to_dtype(DType::U8)?
            .squeeze(0)?
            .permute((1, 2, 0))?
            .flatten_all()?
            .to_vec1::<u8>()?;

        RgbImage::from_raw(w as u32, h as u32, data).ok_or_else(|| {
            StyleTransferError::ShapeMismatch("snapshot", vec![h, w, 3], vec![b, c, h, w])
        })
    }

    /// Write a viewable snapshot of a normalized tensor, overwriting any previous file.
    pub fn save_snapshot(
        &self,
        tensor: &Tensor,
        path: impl AsRef<Path>,
    ) -> Result<(), StyleTransferError> {
        let image = self.tensor_to_image(tensor)?;
        image.save(path.as_ref())?;
        Ok(())
    }
}

/// Persist the raw values of a tensor as safetensors under [`GENERATED_KEY`].
pub fn save_tensor(tensor: &Tensor, path: impl AsRef<Path>) -> Result<(), StyleTransferError> {
    let tensor = tensor.detach().to_device(&Device::Cpu)?;
    let tensors = HashMap::from([(GENERATED_KEY.to_string(), tensor)]);
    candle_core::safetensors::save(&tensors, path.as_ref())?;
    Ok(())
}

/// Load a tensor written by [`save_tensor`] onto `device`.
pub fn load_tensor(path: impl AsRef<Path>, device: &Device) -> Result<Tensor, StyleTransferError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(StyleTransferError::FileDoesNotExist(path.to_path_buf()));
    }

    let mut tensors = candle_core::safetensors::load(path, device)?;
    tensors
        .remove(GENERATED_KEY)
        .ok_or_else(|| StyleTransferError::MissingTensor(GENERATED_KEY.to_string(), path.into()))
}
