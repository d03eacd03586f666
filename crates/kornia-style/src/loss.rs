use candle_core::Tensor;

use crate::error::StyleTransferError;

/// The losses of one evaluation, as scalar tensors attached to the autodiff graph.
pub struct Losses {
    /// Sum over layers of the mean squared error between generated and content features.
    pub content: Tensor,
    /// Sum over layers of the mean squared error between generated and style Gram matrices.
    pub style: Tensor,
    /// `alpha * content + beta * style`.
    pub total: Tensor,
}

impl Losses {
    /// Read the three losses back as `(content, style, total)`.
    pub fn to_scalars(&self) -> Result<(f32, f32, f32), StyleTransferError> {
        Ok((
            self.content.to_scalar::<f32>()?,
            self.style.to_scalar::<f32>()?,
            self.total.to_scalar::<f32>()?,
        ))
    }
}

/// Compute the Gram matrix of a `(1, C, H, W)` feature map.
///
/// The feature map is flattened to `F` with shape `(C, H*W)` and the result is
/// `F · Fᵀ` with shape `(C, C)`.
pub fn gram_matrix(feature: &Tensor) -> Result<Tensor, StyleTransferError> {
    if feature.rank() != 4 {
        return Err(StyleTransferError::InvalidTensorRank(
            4,
            feature.dims().to_vec(),
        ));
    }
    let (b, c, h, w) = feature.dims4()?;
    if b != 1 {
        return Err(StyleTransferError::BatchSizeNotOne(b));
    }

    let f = feature.reshape((c, h * w))?;
    Ok(f.matmul(&f.t()?)?)
}

fn ensure_same_shape(
    name: &'static str,
    a: &Tensor,
    b: &Tensor,
) -> Result<(), StyleTransferError> {
    if a.dims() != b.dims() {
        return Err(StyleTransferError::ShapeMismatch(
            name,
            a.dims().to_vec(),
            b.dims().to_vec(),
        ));
    }
    Ok(())
}

fn mse(a: &Tensor, b: &Tensor) -> Result<Tensor, StyleTransferError> {
    Ok((a - b)?.sqr()?.mean_all()?)
}

fn sum_losses(losses: Vec<Tensor>) -> Result<Tensor, StyleTransferError> {
    let mut losses = losses.into_iter();
    let first = losses.next().ok_or(StyleTransferError::EmptyFeatureSet)?;
    losses.try_fold(first, |acc, loss| -> Result<Tensor, StyleTransferError> {
        Ok((acc + loss)?)
    })
}

/// Content loss: `Σ_i mean((generated_i − content_i)²)`.
pub fn content_loss(
    generated: &[Tensor],
    content: &[Tensor],
) -> Result<Tensor, StyleTransferError> {
    if generated.len() != content.len() {
        return Err(StyleTransferError::FeatureCountMismatch {
            generated: generated.len(),
            content: content.len(),
            style: content.len(),
        });
    }

    let losses = generated
        .iter()
        .zip(content.iter())
        .map(|(g, c)| {
            ensure_same_shape("content feature", g, c)?;
            mse(g, c)
        })
        .collect::<Result<Vec<_>, _>>()?;

    sum_losses(losses)
}

/// Style loss: `Σ_i mean((G(generated_i) − G(style_i))²)` with `G` the Gram matrix.
pub fn style_loss(generated: &[Tensor], style: &[Tensor]) -> Result<Tensor, StyleTransferError> {
    if generated.len() != style.len() {
        return Err(StyleTransferError::FeatureCountMismatch {
            generated: generated.len(),
            content: style.len(),
            style: style.len(),
        });
    }

    let losses = generated
        .iter()
        .zip(style.iter())
        .map(|(g, s)| {
            ensure_same_shape("style feature", g, s)?;
            mse(&gram_matrix(g)?, &gram_matrix(s)?)
        })
        .collect::<Result<Vec<_>, _>>()?;

    sum_losses(losses)
}

/// Weighted combination of the content and style losses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LossComputer {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for LossComputer {
    fn default() -> Self {
        // Gram entries grow with channels and spatial size, hence the small style weight
        Self {
            alpha: 1.0,
            beta: 0.01,
        }
    }
}

impl LossComputer {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    /// Compute the losses for three parallel feature sets.
    ///
    /// # Arguments
    ///
    /// * `generated` - Features of the image being optimized.
    /// * `content` - Features of the content image.
    /// * `style` - Features of the style image.
    ///
    /// # Errors
    ///
    /// The three sets must have the same length and pairwise equal shapes.
    pub fn compute(
        &self,
        generated: &[Tensor],
        content: &[Tensor],
        style: &[Tensor],
    ) -> Result<Losses, StyleTransferError> {
        if generated.len() != content.len() || generated.len() != style.len() {
            return Err(StyleTransferError::FeatureCountMismatch {
                generated: generated.len(),
                content: content.len(),
                style: style.len(),
            });
        }

        let content = content_loss(generated, content)?;
        let style = style_loss(generated, style)?;
        let total = (content.affine(self.alpha, 0.0)? + style.affine(self.beta, 0.0)?)?;

        Ok(Losses {
            content,
            style,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::{DType, Device};

    fn feature(seed: f32, shape: (usize, usize, usize, usize)) -> candle_core::Result<Tensor> {
        let n = shape.0 * shape.1 * shape.2 * shape.3;
        Tensor::arange(0f32, n as f32, &Device::Cpu)?
            .affine(0.5, seed as f64)?
            .cos()?
            .reshape(shape)
    }

    #[test]
    fn test_gram_matrix_values() -> Result<(), StyleTransferError> {
        // two channels of a 1x2 map: [1, 2] and [3, 4]
        let f = Tensor::from_slice(&[1f32, 2., 3., 4.], (1, 2, 1, 2), &Device::Cpu)?;
        let g = gram_matrix(&f)?.to_vec2::<f32>()?;
        assert_eq!(g, vec![vec![5.0, 11.0], vec![11.0, 25.0]]);
        Ok(())
    }

    #[test]
    fn test_gram_matrix_symmetric() -> Result<(), StyleTransferError> {
        let f = feature(0.3, (1, 5, 4, 3))?;
        let g = gram_matrix(&f)?;
        assert_eq!(g.dims(), &[5, 5]);
        let g = g.to_vec2::<f32>()?;
        for i in 0..5 {
            for j in 0..5 {
                assert_relative_eq!(g[i][j], g[j][i], epsilon = 1e-4);
            }
        }
        Ok(())
    }

    #[test]
    fn test_gram_matrix_rejects_batches() -> Result<(), StyleTransferError> {
        let f = Tensor::zeros((2, 3, 4, 4), DType::F32, &Device::Cpu)?;
        assert!(matches!(
            gram_matrix(&f),
            Err(StyleTransferError::BatchSizeNotOne(2))
        ));
        let f = Tensor::zeros((3, 4, 4), DType::F32, &Device::Cpu)?;
        assert!(matches!(
            gram_matrix(&f),
            Err(StyleTransferError::InvalidTensorRank(4, _))
        ));
        Ok(())
    }

    #[test]
    fn test_content_loss_zero_for_identical() -> Result<(), StyleTransferError> {
        let a = vec![feature(0.1, (1, 3, 4, 4))?, feature(0.2, (1, 6, 2, 2))?];
        let loss = content_loss(&a, &a)?.to_scalar::<f32>()?;
        assert_eq!(loss, 0.0);
        Ok(())
    }

    #[test]
    fn test_style_loss_zero_for_identical() -> Result<(), StyleTransferError> {
        let a = vec![feature(0.1, (1, 3, 4, 4))?, feature(0.2, (1, 6, 2, 2))?];
        let loss = style_loss(&a, &a)?.to_scalar::<f32>()?;
        assert_eq!(loss, 0.0);
        Ok(())
    }

    #[test]
    fn test_content_loss_sums_layer_means() -> Result<(), StyleTransferError> {
        let device = Device::Cpu;
        let g = vec![
            Tensor::full(1f32, (1, 2, 2, 2), &device)?,
            Tensor::full(3f32, (1, 1, 2, 2), &device)?,
        ];
        let c = vec![
            Tensor::zeros((1, 2, 2, 2), DType::F32, &device)?,
            Tensor::full(1f32, (1, 1, 2, 2), &device)?,
        ];
        // 1 + 4
        let loss = content_loss(&g, &c)?.to_scalar::<f32>()?;
        assert_relative_eq!(loss, 5.0);
        Ok(())
    }

    #[test]
    fn test_style_loss_value() -> Result<(), StyleTransferError> {
        let device = Device::Cpu;
        let g = vec![Tensor::from_slice(&[1f32, 2., 3., 4.], (1, 2, 1, 2), &device)?];
        let s = vec![Tensor::zeros((1, 2, 1, 2), DType::F32, &device)?];
        // gram = [[5, 11], [11, 25]], mean of squares = (25 + 121 + 121 + 625) / 4
        let loss = style_loss(&g, &s)?.to_scalar::<f32>()?;
        assert_relative_eq!(loss, 223.0);
        Ok(())
    }

    #[test]
    fn test_loss_computer_weights() -> Result<(), StyleTransferError> {
        let generated = vec![feature(0.1, (1, 3, 4, 4))?];
        let content = vec![feature(0.7, (1, 3, 4, 4))?];
        let style = vec![feature(1.3, (1, 3, 4, 4))?];

        let computer = LossComputer::new(2.0, 0.5);
        let losses = computer.compute(&generated, &content, &style)?;
        let (c, s, total) = losses.to_scalars()?;
        assert!(c > 0.0);
        assert!(s > 0.0);
        assert_relative_eq!(total, 2.0 * c + 0.5 * s, epsilon = 1e-4);

        let defaults = LossComputer::default();
        assert_eq!(defaults.alpha, 1.0);
        assert_eq!(defaults.beta, 0.01);
        Ok(())
    }

    #[test]
    fn test_shape_mismatch() -> Result<(), StyleTransferError> {
        let a = vec![feature(0.1, (1, 3, 4, 4))?];
        let b = vec![feature(0.1, (1, 3, 5, 5))?];
        assert!(matches!(
            content_loss(&a, &b),
            Err(StyleTransferError::ShapeMismatch(..))
        ));
        assert!(matches!(
            LossComputer::default().compute(&a, &a, &b),
            Err(StyleTransferError::ShapeMismatch(..))
        ));
        Ok(())
    }

    #[test]
    fn test_count_mismatch() -> Result<(), StyleTransferError> {
        let a = vec![feature(0.1, (1, 3, 4, 4))?];
        let b = vec![feature(0.1, (1, 3, 4, 4))?, feature(0.2, (1, 3, 4, 4))?];
        assert!(matches!(
            LossComputer::default().compute(&a, &b, &a),
            Err(StyleTransferError::FeatureCountMismatch {
                generated: 1,
                content: 2,
                style: 1
            })
        ));
        assert!(matches!(
            content_loss(&[], &[]),
            Err(StyleTransferError::EmptyFeatureSet)
        ));
        Ok(())
    }
}
