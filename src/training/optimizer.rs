/// SGD optimizer with momentum
///
/// Supports classical and Nesterov momentum plus coupled L2 weight decay.
use candle_core::backprop::GradStore;
use candle_core::{Result, Tensor, Var};
use candle_nn::Optimizer;
use serde::{Deserialize, Serialize};

/// SGD optimizer configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SgdConfig {
    /// Learning rate
    pub lr: f64,
    /// Momentum factor (0 disables momentum)
    pub momentum: f64,
    /// Use Nesterov momentum
    pub nesterov: bool,
    /// Coupled decay added to the gradient (`g += weight_decay * w`)
    ///
    /// A loss penalty `l2 * ||w||^2` corresponds to `weight_decay = 2 * l2`.
    pub weight_decay: f64,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            lr: 0.1,
            momentum: 0.9,
            nesterov: true,
            weight_decay: weight_decay_for_l2(1e-4),
        }
    }
}

/// Decay coefficient equivalent to adding `l2 * ||w||^2` to the loss
pub fn weight_decay_for_l2(l2: f64) -> f64 {
    2.0 * l2
}

/// Parameter with its velocity buffer
#[derive(Debug)]
struct ParamState {
    var: Var,
    velocity: Tensor,
}

/// SGD optimizer
///
/// Per parameter with gradient `g`:
/// ```text
/// g  = g + weight_decay * w
/// v  = momentum * v - lr * g
/// w += nesterov ? momentum * v - lr * g : v
/// ```
/// Parameters that received no gradient (e.g. batch norm running statistics)
/// are left untouched.
#[derive(Debug)]
pub struct Sgd {
    config: SgdConfig,
    params: Vec<ParamState>,
}

impl Sgd {
    /// Get configuration
    pub fn config(&self) -> &SgdConfig {
        &self.config
    }

    /// Number of optimized parameters
    pub fn num_params(&self) -> usize {
        self.params.len()
    }
}

impl Optimizer for Sgd {
    type Config = SgdConfig;

    fn new(vars: Vec<Var>, config: SgdConfig) -> Result<Self> {
        let params = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| {
                let velocity = var.as_tensor().zeros_like()?;
                Ok(ParamState { var, velocity })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { config, params })
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        let SgdConfig {
            lr,
            momentum,
            nesterov,
            weight_decay,
        } = self.config;

        for param in self.params.iter_mut() {
            let Some(grad) = grads.get(param.var.as_tensor()) else {
                continue;
            };

            let grad = if weight_decay > 0.0 {
                (grad + (param.var.as_tensor() * weight_decay)?)?
            } else {
                grad.clone()
            };

            let scaled_grad = (&grad * lr)?;
            let velocity = ((&param.velocity * momentum)? - &scaled_grad)?;

            let update = if nesterov {
                ((&velocity * momentum)? - &scaled_grad)?
            } else {
                velocity.clone()
            };

            param.var.set(&(param.var.as_tensor() + update)?)?;
            param.velocity = velocity;
        }

        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.config.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.config.lr = lr;
    }
}
