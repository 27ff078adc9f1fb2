/// Per-channel image normalization
use candle_core::{DType, Tensor};

/// CIFAR-10 training set channel means (RGB, 0-255 scale)
pub const CIFAR10_MEAN: [f32; 3] = [125.307, 122.95, 113.865];

/// CIFAR-10 training set channel standard deviations (RGB, 0-255 scale)
pub const CIFAR10_STD: [f32; 3] = [62.9932, 62.0887, 66.7048];

/// Normalize `[N, C, H, W]` images channel-wise: `(x - mean[c]) / std[c]`
///
/// The output is `f32` whatever the input dtype.
pub fn normalize_channels(images: &Tensor, mean: &[f32], std: &[f32]) -> crate::Result<Tensor> {
    if images.rank() != 4 {
        return Err(crate::ResNetError::Config(format!(
            "expected [N, C, H, W] images, got shape {:?}",
            images.dims()
        )));
    }

    let channels = images.dim(1)?;
    if mean.len() != channels || std.len() != channels {
        return Err(crate::ResNetError::Config(format!(
            "{} channels but {} means and {} stds",
            channels,
            mean.len(),
            std.len()
        )));
    }

    if std.iter().any(|s| *s == 0.0) {
        return Err(crate::ResNetError::Config(
            "channel std must be non-zero".to_string(),
        ));
    }

    let device = images.device();
    let mean = Tensor::from_slice(mean, (1, channels, 1, 1), device)?;
    let std = Tensor::from_slice(std, (1, channels, 1, 1), device)?;

    let normalized = images
        .to_dtype(DType::F32)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)?;

    Ok(normalized)
}
