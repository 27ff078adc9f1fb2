/// Data feeding for training and evaluation
pub mod preprocess;
pub mod tensor_dataset;

pub use preprocess::{normalize_channels, CIFAR10_MEAN, CIFAR10_STD};
pub use tensor_dataset::{TensorDataLoader, TensorDataset};

use candle_core::{Device, Result, Tensor};

/// Generic data loader trait
pub trait BatchDataLoader {
    /// Get next batch of (input, label) tensors
    fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>>;

    /// Reset loader for new epoch
    fn reset(&mut self);

    /// Get total number of batches
    fn num_batches(&self) -> usize;
}
