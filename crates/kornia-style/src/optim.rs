use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};

use crate::error::StyleTransferError;

/// The image being optimized together with the Adam state bound to it.
///
/// The pixels are the only variable of the autodiff graph. Each call to
/// [`PixelOptimizer::step`] computes a fresh set of gradients, so there is no
/// accumulated gradient to reset between iterations.
pub struct PixelOptimizer {
    image: Var,
    adam: AdamW,
    steps: usize,
}

impl PixelOptimizer {
    /// Bind a new Adam optimizer to a copy of `init`.
    ///
    /// `init` itself is never modified.
    pub fn new(init: &Tensor, learning_rate: f64) -> Result<Self, StyleTransferError> {
        let image = Var::from_tensor(&init.detach().copy()?)?;

        // plain Adam: no decoupled weight decay
        let params = ParamsAdamW {
            lr: learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        };
        let adam = AdamW::new(vec![image.clone()], params)?;

        Ok(Self {
            image,
            adam,
            steps: 0,
        })
    }

    /// The current value of the image.
    pub fn image(&self) -> &Tensor {
        self.image.as_tensor()
    }

    /// Backpropagate `loss` to the pixels and apply one Adam update in place.
    pub fn step(&mut self, loss: &Tensor) -> Result<(), StyleTransferError> {
        let grads = loss.backward()?;
        self.adam.step(&grads)?;
        self.steps += 1;
        Ok(())
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn learning_rate(&self) -> f64 {
        self.adam.learning_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::{DType, Device};

    #[test]
    fn test_first_step_moves_by_learning_rate() -> Result<(), StyleTransferError> {
        let device = Device::Cpu;
        let init = Tensor::zeros((1, 3, 2, 2), DType::F32, &device)?;
        let target = Tensor::ones((1, 3, 2, 2), DType::F32, &device)?;

        let mut optimizer = PixelOptimizer::new(&init, 0.1)?;
        let loss = (optimizer.image() - &target)?.sqr()?.mean_all()?;
        optimizer.step(&loss)?;

        for v in optimizer.image().flatten_all()?.to_vec1::<f32>()? {
            assert_relative_eq!(v, 0.1, epsilon = 1e-5);
        }
        assert_eq!(optimizer.steps(), 1);
        assert_relative_eq!(optimizer.learning_rate(), 0.1);
        Ok(())
    }

    #[test]
    fn test_init_is_not_aliased() -> Result<(), StyleTransferError> {
        let device = Device::Cpu;
        let init = Tensor::zeros((1, 3, 2, 2), DType::F32, &device)?;
        let mut optimizer = PixelOptimizer::new(&init, 0.5)?;
        let loss = (optimizer.image() - 1.0)?.sqr()?.sum_all()?;
        optimizer.step(&loss)?;

        assert!(init.flatten_all()?.to_vec1::<f32>()?.iter().all(|v| *v == 0.0));
        assert!(optimizer
            .image()
            .flatten_all()?
            .to_vec1::<f32>()?
            .iter()
            .all(|v| *v > 0.0));
        Ok(())
    }

    #[test]
    fn test_zero_gradient_keeps_image() -> Result<(), StyleTransferError> {
        let device = Device::Cpu;
        let init = Tensor::arange(0f32, 12f32, &device)?.reshape((1, 3, 2, 2))?;
        let mut optimizer = PixelOptimizer::new(&init, 0.1)?;
        for _ in 0..3 {
            let loss = (optimizer.image() - &init)?.sqr()?.mean_all()?;
            optimizer.step(&loss)?;
        }
        assert_eq!(
            optimizer.image().flatten_all()?.to_vec1::<f32>()?,
            init.flatten_all()?.to_vec1::<f32>()?
        );
        Ok(())
    }

    #[test]
    fn test_loss_decreases() -> Result<(), StyleTransferError> {
        let device = Device::Cpu;
        let init = Tensor::zeros((1, 3, 4, 4), DType::F32, &device)?;
        let target = Tensor::arange(0f32, 48f32, &device)?.reshape((1, 3, 4, 4))?;
        let mut optimizer = PixelOptimizer::new(&init, 0.05)?;

        let mut previous = f32::INFINITY;
        for _ in 0..10 {
            let loss = (optimizer.image() - &target)?.sqr()?.mean_all()?;
            let value = loss.to_scalar::<f32>()?;
            assert!(value < previous);
            previous = value;
            optimizer.step(&loss)?;
        }
        Ok(())
    }
}
