/// Best-model checkpointing
use std::fmt;
use std::path::{Path, PathBuf};

use candle_nn::VarMap;
use serde::{Deserialize, Serialize};

use super::callback::{Callback, EpochLogs};

/// Metric watched by [`BestCheckpoint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    Loss,
    Accuracy,
    ValLoss,
    ValAccuracy,
}

impl Monitor {
    /// Read the watched value from epoch logs
    pub fn value(&self, logs: &EpochLogs) -> Option<f64> {
        match self {
            Monitor::Loss => Some(logs.loss),
            Monitor::Accuracy => Some(logs.accuracy),
            Monitor::ValLoss => logs.val_loss,
            Monitor::ValAccuracy => logs.val_accuracy,
        }
    }

    /// Accuracies improve upwards, losses downwards
    pub fn higher_is_better(&self) -> bool {
        matches!(self, Monitor::Accuracy | Monitor::ValAccuracy)
    }

    fn improves(&self, value: f64, best: Option<f64>) -> bool {
        match best {
            None => true,
            Some(best) if self.higher_is_better() => value > best,
            Some(best) => value < best,
        }
    }
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Monitor::Loss => "loss",
            Monitor::Accuracy => "accuracy",
            Monitor::ValLoss => "val_loss",
            Monitor::ValAccuracy => "val_accuracy",
        };
        f.write_str(name)
    }
}

/// Checkpoint metadata, written next to the weights as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Epoch that produced the weights
    pub epoch: usize,
    /// Learning rate at checkpoint
    pub lr: f64,
    /// Watched metric
    pub monitor: Monitor,
    /// Value of the watched metric
    pub value: f64,
}

impl CheckpointMetadata {
    /// Sidecar path for a weights file (`best_model.safetensors` -> `best_model.json`)
    pub fn path_for(weights: &Path) -> PathBuf {
        weights.with_extension("json")
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json.as_bytes())?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// Save the model whenever the watched metric improves
pub struct BestCheckpoint {
    path: PathBuf,
    monitor: Monitor,
    best: Option<f64>,
    best_epoch: Option<usize>,
}

impl BestCheckpoint {
    /// Create new checkpoint callback writing weights to `path`
    pub fn new<P: Into<PathBuf>>(path: P, monitor: Monitor) -> Self {
        Self {
            path: path.into(),
            monitor,
            best: None,
            best_epoch: None,
        }
    }

    /// Best value seen so far
    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Epoch of the last saved checkpoint
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, varmap: &VarMap, metadata: &CheckpointMetadata) -> crate::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        varmap.save(&self.path)?;
        metadata.save(CheckpointMetadata::path_for(&self.path))
    }
}

impl Callback for BestCheckpoint {
    fn on_epoch_end(&mut self, epoch: usize, logs: &EpochLogs, varmap: &VarMap) -> crate::Result<()> {
        let Some(value) = self.monitor.value(logs) else {
            log::warn!(
                "Can save best model only with {} available, skipping",
                self.monitor
            );
            return Ok(());
        };

        if !value.is_finite() {
            log::warn!(
                "Epoch {}: {} is {}, not a checkpoint candidate",
                epoch + 1,
                self.monitor,
                value
            );
            return Ok(());
        }

        if !self.monitor.improves(value, self.best) {
            log::info!(
                "Epoch {}: {} did not improve from {:.5}",
                epoch + 1,
                self.monitor,
                self.best.unwrap_or(value)
            );
            return Ok(());
        }

        match self.best {
            Some(best) => log::info!(
                "Epoch {}: {} improved from {:.5} to {:.5}, saving model to {}",
                epoch + 1,
                self.monitor,
                best,
                value,
                self.path.display()
            ),
            None => log::info!(
                "Epoch {}: {} is {:.5}, saving model to {}",
                epoch + 1,
                self.monitor,
                value,
                self.path.display()
            ),
        }

        let metadata = CheckpointMetadata {
            epoch,
            lr: logs.lr,
            monitor: self.monitor,
            value,
        };
        self.save(varmap, &metadata)?;

        self.best = Some(value);
        self.best_epoch = Some(epoch);

        Ok(())
    }

    fn name(&self) -> &str {
        "BestCheckpoint"
    }
}
