/// In-memory dataset of (input, label) tensors
use candle_core::{DType, Device, Result, Tensor};
use rand::seq::SliceRandom;

/// Inputs `[N, ...]` paired with class labels `[N]`
#[derive(Debug, Clone)]
pub struct TensorDataset {
    inputs: Tensor,
    labels: Tensor,
}

impl TensorDataset {
    /// Create dataset; labels are converted to `u32`
    pub fn new(inputs: Tensor, labels: Tensor) -> crate::Result<Self> {
        let num_inputs = inputs.dims().first().copied().unwrap_or(0);

        if labels.rank() != 1 {
            return Err(crate::ResNetError::Config(format!(
                "labels must be a 1-D tensor, got shape {:?}",
                labels.dims()
            )));
        }

        if labels.dim(0)? != num_inputs {
            return Err(crate::ResNetError::Config(format!(
                "Shape mismatch: {} inputs != {} labels",
                num_inputs,
                labels.dim(0)?
            )));
        }

        let labels = labels.to_dtype(DType::U32)?;
        Ok(Self { inputs, labels })
    }

    /// Get number of examples
    pub fn len(&self) -> usize {
        self.labels.dims()[0]
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn inputs(&self) -> &Tensor {
        &self.inputs
    }

    pub fn labels(&self) -> &Tensor {
        &self.labels
    }
}

/// Batches over a [`TensorDataset`], optionally reshuffled every epoch
pub struct TensorDataLoader {
    dataset: TensorDataset,
    batch_size: usize,
    current_idx: usize,
    indices: Vec<u32>,
    shuffle: bool,
}

impl TensorDataLoader {
    /// Create new data loader
    pub fn new(dataset: TensorDataset, batch_size: usize, shuffle: bool) -> crate::Result<Self> {
        if batch_size == 0 {
            return Err(crate::ResNetError::Config(
                "batch_size must be > 0".to_string(),
            ));
        }

        let mut indices: Vec<u32> = (0..dataset.len() as u32).collect();
        if shuffle {
            indices.shuffle(&mut rand::thread_rng());
        }

        Ok(Self {
            dataset,
            batch_size,
            current_idx: 0,
            indices,
            shuffle,
        })
    }

    /// Get next batch (inputs, labels)
    pub fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>> {
        if self.current_idx >= self.indices.len() {
            return Ok(None);
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.current_idx..end_idx];
        self.current_idx = end_idx;

        let index = Tensor::from_slice(batch_indices, batch_indices.len(), self.dataset.inputs.device())?;
        let inputs = self.dataset.inputs.index_select(&index, 0)?.to_device(device)?;
        let labels = self.dataset.labels.index_select(&index, 0)?.to_device(device)?;

        Ok(Some((inputs, labels)))
    }

    /// Reset loader for new epoch
    pub fn reset(&mut self) {
        self.current_idx = 0;

        if self.shuffle {
            self.indices.shuffle(&mut rand::thread_rng());
        }
    }

    /// Get number of batches (last one may be partial)
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Get dataset reference
    pub fn dataset(&self) -> &TensorDataset {
        &self.dataset
    }
}

impl super::BatchDataLoader for TensorDataLoader {
    fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>> {
        TensorDataLoader::next_batch(self, device)
    }

    fn reset(&mut self) {
        TensorDataLoader::reset(self)
    }

    fn num_batches(&self) -> usize {
        TensorDataLoader::num_batches(self)
    }
}
