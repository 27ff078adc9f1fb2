/// Residual network for small images
use candle_core::{Result, Tensor};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, Linear, Module, ModuleT, VarBuilder};

use crate::config::ResNetConfig;
use crate::layers::ResidualBlock;

pub mod loader;

pub use loader::load_model;

/// Pre-activation ResNet
///
/// 3x3 stem convolution, three stages of `stack_num` residual blocks (the
/// first block of stages 2 and 3 halves the resolution), batch norm + ReLU,
/// global average pooling and a linear classifier.
///
/// Outputs logits of shape `[batch, num_classes]`; softmax is left to the loss.
pub struct ResNet {
    config: ResNetConfig,
    stem: Conv2d,
    blocks: Vec<ResidualBlock>,
    bn: BatchNorm,
    head: Linear,
}

impl ResNet {
    /// Create new ResNet
    pub fn new(config: ResNetConfig, vb: VarBuilder) -> crate::Result<Self> {
        config.validate()?;

        let bn_config = config.batch_norm_config();
        let [c1, c2, c3] = config.stage_channels;

        let stem_cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        let stem = candle_nn::conv2d(config.in_channels, c1, 3, stem_cfg, vb.pp("stem"))?;

        let mut blocks = Vec::with_capacity(3 * config.stack_num);
        let mut in_channels = c1;
        for (stage, &channels) in [c1, c2, c3].iter().enumerate() {
            for i in 0..config.stack_num {
                let downsample = stage > 0 && i == 0;
                blocks.push(ResidualBlock::new(
                    in_channels,
                    channels,
                    downsample,
                    bn_config,
                    vb.pp(format!("stage_{}.block_{}", stage, i)),
                )?);
                in_channels = channels;
            }
        }

        let bn = candle_nn::batch_norm(c3, bn_config, vb.pp("bn"))?;
        let head = candle_nn::linear(c3, config.num_classes, vb.pp("head"))?;

        Ok(Self {
            config,
            stem,
            blocks,
            bn,
            head,
        })
    }

    /// Get configuration
    pub fn config(&self) -> &ResNetConfig {
        &self.config
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

impl ModuleT for ResNet {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut h = self.stem.forward(xs)?;

        for block in &self.blocks {
            h = block.forward_t(&h, train)?;
        }

        // [batch, channels, h, w] -> [batch, channels]
        let pooled = self.bn.forward_t(&h, train)?.relu()?.mean((2, 3))?;

        self.head.forward(&pooled)
    }
}
