/// Training loop hooks
///
/// The trainer notifies every registered [`Callback`] in registration order:
/// `on_train_begin`, then per epoch `on_epoch_begin`, one `on_batch_begin` per
/// batch (before its gradient step) and `on_epoch_end`, and finally
/// `on_train_end`.
use candle_nn::{Optimizer, VarMap};
use serde::{Deserialize, Serialize};

/// Mutable learning rate owned by an optimizer
pub trait LearningRateSlot {
    /// Get current learning rate
    fn get_lr(&self) -> f64;

    /// Set learning rate
    fn set_lr(&mut self, lr: f64);
}

impl<O: Optimizer> LearningRateSlot for O {
    fn get_lr(&self) -> f64 {
        self.learning_rate()
    }

    fn set_lr(&mut self, lr: f64) {
        self.set_learning_rate(lr)
    }
}

/// Metrics collected over one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochLogs {
    /// Epoch index (0-based)
    pub epoch: usize,
    /// Mean training loss
    pub loss: f64,
    /// Training accuracy
    pub accuracy: f64,
    /// Validation loss (if validation data was given)
    pub val_loss: Option<f64>,
    /// Validation accuracy (if validation data was given)
    pub val_accuracy: Option<f64>,
    /// Learning rate used for the last batch of the epoch
    pub lr: f64,
}

/// Observer of the training timeline
///
/// All hooks default to no-ops.
pub trait Callback {
    /// Called once before the first epoch
    fn on_train_begin(&mut self, _num_epochs: usize) -> crate::Result<()> {
        Ok(())
    }

    /// Called before any batch of `epoch`
    fn on_epoch_begin(&mut self, _epoch: usize) -> crate::Result<()> {
        Ok(())
    }

    /// Called before the gradient step of `batch` (index within the epoch)
    fn on_batch_begin(
        &mut self,
        _batch: usize,
        _optimizer: &mut dyn LearningRateSlot,
    ) -> crate::Result<()> {
        Ok(())
    }

    /// Called after training and validation of `epoch`
    fn on_epoch_end(
        &mut self,
        _epoch: usize,
        _logs: &EpochLogs,
        _varmap: &VarMap,
    ) -> crate::Result<()> {
        Ok(())
    }

    /// Called once after the last epoch
    fn on_train_end(&mut self, _history: &[EpochLogs]) -> crate::Result<()> {
        Ok(())
    }

    /// Callback name for logging
    fn name(&self) -> &str {
        "Callback"
    }
}
