/// Configuration for the residual network
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ResNetConfig {
    /// Residual blocks per stage (3 stages, depth = 6 * stack_num + 2)
    pub stack_num: usize,

    /// Number of output classes
    pub num_classes: usize,

    /// Input image channels
    pub in_channels: usize,

    /// Channels of the three stages
    pub stage_channels: [usize; 3],

    /// Batch norm momentum, candle convention: running = (1 - m) * running + m * batch
    pub bn_momentum: f64,

    /// Batch norm epsilon
    pub bn_eps: f64,
}

impl Default for ResNetConfig {
    fn default() -> Self {
        Self {
            stack_num: 5,
            num_classes: 10,
            in_channels: 3,
            stage_channels: [16, 32, 64],
            bn_momentum: 0.1,
            bn_eps: 1e-5,
        }
    }
}

impl ResNetConfig {
    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.stack_num == 0 {
            return Err(crate::ResNetError::Config(
                "stack_num must be > 0".to_string(),
            ));
        }

        if self.num_classes < 2 {
            return Err(crate::ResNetError::Config(
                "num_classes must be >= 2".to_string(),
            ));
        }

        if self.in_channels == 0 || self.stage_channels.contains(&0) {
            return Err(crate::ResNetError::Config(
                "channel counts must be > 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.bn_momentum) || self.bn_eps <= 0.0 {
            return Err(crate::ResNetError::Config(format!(
                "Invalid batch norm settings: momentum={}, eps={}",
                self.bn_momentum, self.bn_eps
            )));
        }

        Ok(())
    }

    /// Number of weighted layers (convolutions on the main path plus the head)
    pub fn depth(&self) -> usize {
        6 * self.stack_num + 2
    }

    pub fn batch_norm_config(&self) -> candle_nn::BatchNormConfig {
        candle_nn::BatchNormConfig {
            eps: self.bn_eps,
            momentum: self.bn_momentum,
            ..Default::default()
        }
    }
}
