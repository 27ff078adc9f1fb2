/// Pre-activation residual block
use candle_core::{Result, Tensor};
use candle_nn::{BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Module, ModuleT, VarBuilder};

/// BN -> ReLU -> conv3x3 -> BN -> ReLU -> conv3x3, plus shortcut
///
/// When `downsample` is set the first convolution has stride 2 and the
/// shortcut is a strided 1x1 projection of the first activation; otherwise
/// the shortcut is the identity.
pub struct ResidualBlock {
    bn1: BatchNorm,
    conv1: Conv2d,
    bn2: BatchNorm,
    conv2: Conv2d,
    projection: Option<Conv2d>,
}

impl ResidualBlock {
    /// Create new residual block
    ///
    /// # Arguments
    /// * `in_channels` - Channels of the block input
    /// * `out_channels` - Channels of the block output
    /// * `downsample` - Halve the spatial size and project the shortcut
    /// * `bn_config` - Batch norm settings shared by both norms
    /// * `vb` - VarBuilder for parameter initialization
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        downsample: bool,
        bn_config: BatchNormConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        let stride = if downsample { 2 } else { 1 };

        let conv3x3 = |stride| Conv2dConfig {
            padding: 1,
            stride,
            ..Default::default()
        };

        let bn1 = candle_nn::batch_norm(in_channels, bn_config, vb.pp("bn1"))?;
        let conv1 = candle_nn::conv2d(in_channels, out_channels, 3, conv3x3(stride), vb.pp("conv1"))?;
        let bn2 = candle_nn::batch_norm(out_channels, bn_config, vb.pp("bn2"))?;
        let conv2 = candle_nn::conv2d(out_channels, out_channels, 3, conv3x3(1), vb.pp("conv2"))?;

        let projection = if downsample || in_channels != out_channels {
            let cfg = Conv2dConfig {
                stride,
                ..Default::default()
            };
            Some(candle_nn::conv2d(in_channels, out_channels, 1, cfg, vb.pp("projection"))?)
        } else {
            None
        };

        Ok(Self {
            bn1,
            conv1,
            bn2,
            conv2,
            projection,
        })
    }
}

impl ModuleT for ResidualBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let o1 = self.bn1.forward_t(xs, train)?.relu()?;
        let h = self.conv1.forward(&o1)?;
        let o2 = self.bn2.forward_t(&h, train)?.relu()?;
        let h = self.conv2.forward(&o2)?;

        let shortcut = match &self.projection {
            Some(projection) => projection.forward(&o1)?,
            None => xs.clone(),
        };

        h + shortcut
    }
}
