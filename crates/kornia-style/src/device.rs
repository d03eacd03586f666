use candle_core::{Device, Tensor};

use crate::{config::DeviceSelection, error::StyleTransferError};

/// Open the compute device described by `selection`.
///
/// `Auto` falls back to the CPU when no accelerator is available. An explicitly
/// requested accelerator that cannot be opened is an error.
pub fn resolve_device(selection: DeviceSelection) -> Result<Device, StyleTransferError> {
    let device = match selection {
        DeviceSelection::Cpu => Device::Cpu,
        DeviceSelection::Auto => {
            if candle_core::utils::cuda_is_available() {
                match Device::new_cuda(0) {
                    Ok(device) => device,
                    Err(e) => {
                        log::warn!("CUDA not available, defaulting to CPU: {e}");
                        Device::Cpu
                    }
                }
            } else if candle_core::utils::metal_is_available() {
                match Device::new_metal(0) {
                    Ok(device) => device,
                    Err(e) => {
                        log::warn!("Metal not available, defaulting to CPU: {e}");
                        Device::Cpu
                    }
                }
            } else {
                Device::Cpu
            }
        }
        DeviceSelection::Cuda(ordinal) => Device::new_cuda(ordinal).map_err(|e| {
            StyleTransferError::DeviceUnavailable(selection.to_string(), e.to_string())
        })?,
        DeviceSelection::Metal(ordinal) => Device::new_metal(ordinal).map_err(|e| {
            StyleTransferError::DeviceUnavailable(selection.to_string(), e.to_string())
        })?,
    };

    log::debug!("Using device: {:?}", device.location());

    Ok(device)
}

/// Fail unless `tensor` lives on `device`.
pub(crate) fn ensure_same_device(
    name: &'static str,
    tensor: &Tensor,
    device: &Device,
) -> Result<(), StyleTransferError> {
    if !tensor.device().same_device(device) {
        return Err(StyleTransferError::DeviceMismatch(
            name,
            format!("{:?}", device.location()),
        ));
    }
    Ok(())
}
