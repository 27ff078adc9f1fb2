/// Weight loading from safetensors files
use std::path::Path;
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use crate::ResNetConfig;
use super::ResNet;

/// Load model from a safetensors file written by the trainer or a checkpoint
///
/// # Arguments
/// * `config` - Model configuration (must match the saved weights)
/// * `weights_path` - Path to safetensors file
/// * `device` - Device to load model on
pub fn load_model<P: AsRef<Path>>(
    config: ResNetConfig,
    weights_path: P,
    device: &Device,
) -> crate::Result<ResNet> {
    let tensors = candle_core::safetensors::load(weights_path.as_ref(), device)?;
    let vb = VarBuilder::from_tensors(tensors, DType::F32, device);

    ResNet::new(config, vb).map_err(|e| match e {
        crate::ResNetError::Candle(e) => crate::ResNetError::Model(format!(
            "weights in {} do not match the model config: {}",
            weights_path.as_ref().display(),
            e
        )),
        other => other,
    })
}
