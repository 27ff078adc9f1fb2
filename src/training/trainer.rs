/// Training loop for ResNet
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{loss, ModuleT, Optimizer, VarBuilder, VarMap};
use std::path::{Path, PathBuf};

use crate::data::BatchDataLoader;
use crate::models::ResNet;
use crate::ResNetConfig;
use super::callback::{Callback, EpochLogs};
use super::checkpoint::Monitor;
use super::optimizer::{weight_decay_for_l2, Sgd, SgdConfig};
use super::scheduler::ScheduleConfig;

/// Training configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of training epochs (also the cosine schedule horizon)
    pub num_epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Peak learning rate
    pub base_lr: f64,
    /// Epochs of linear warmup
    pub warm_up_epochs: usize,
    /// SGD momentum
    pub momentum: f64,
    /// Use Nesterov momentum
    pub nesterov: bool,
    /// Coupled weight decay (`g += weight_decay * w`), twice the equivalent L2 loss coefficient
    pub weight_decay: f64,
    /// Checkpoint directory
    pub checkpoint_dir: PathBuf,
    /// Metric deciding which checkpoint is the best
    pub monitor: Monitor,
    /// Log every N steps
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_epochs: 500,
            batch_size: 256,
            base_lr: 0.1,
            warm_up_epochs: 5,
            momentum: 0.9,
            nesterov: true,
            weight_decay: weight_decay_for_l2(1e-4),
            checkpoint_dir: PathBuf::from("checkpoints"),
            monitor: Monitor::ValAccuracy,
            log_every: 100,
        }
    }
}

impl TrainingConfig {
    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch_size == 0 {
            return Err(crate::ResNetError::Config(
                "batch_size must be > 0".to_string(),
            ));
        }

        if self.warm_up_epochs >= self.num_epochs {
            return Err(crate::ResNetError::Config(format!(
                "warm_up_epochs ({}) must be < num_epochs ({})",
                self.warm_up_epochs, self.num_epochs
            )));
        }

        if !(self.base_lr.is_finite() && self.base_lr > 0.0) {
            return Err(crate::ResNetError::Config(format!(
                "base_lr must be a positive finite number, got {}",
                self.base_lr
            )));
        }

        if !(0.0..1.0).contains(&self.momentum) {
            return Err(crate::ResNetError::Config(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }

        if self.weight_decay < 0.0 {
            return Err(crate::ResNetError::Config(
                "weight_decay must be >= 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Schedule sharing this run's epoch count
    pub fn schedule_config(&self, steps_per_epoch: usize) -> ScheduleConfig {
        ScheduleConfig {
            base_lr: self.base_lr,
            steps_per_epoch,
            warm_up_epochs: self.warm_up_epochs,
            total_epochs: self.num_epochs,
        }
    }

    pub fn sgd_config(&self) -> SgdConfig {
        SgdConfig {
            lr: self.base_lr,
            momentum: self.momentum,
            nesterov: self.nesterov,
            weight_decay: self.weight_decay,
        }
    }

    /// Where the best checkpoint is written
    pub fn best_model_path(&self) -> PathBuf {
        self.checkpoint_dir.join("best_model.safetensors")
    }

    /// Where the weights are written after the last epoch
    pub fn final_model_path(&self) -> PathBuf {
        self.checkpoint_dir.join("final_model.safetensors")
    }
}

/// Trainer driving a model through epochs and batches
///
/// Callbacks are notified in registration order, so a learning rate
/// scheduler should be registered before callbacks that read the rate.
pub struct Trainer<M: ModuleT = ResNet> {
    model: M,
    varmap: VarMap,
    optimizer: Sgd,
    callbacks: Vec<Box<dyn Callback>>,
    config: TrainingConfig,
    device: Device,
    step: usize,
}

impl Trainer<ResNet> {
    /// Create new trainer with a freshly initialized ResNet
    pub fn new(
        model_config: ResNetConfig,
        training_config: TrainingConfig,
        device: Device,
    ) -> crate::Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = ResNet::new(model_config, vb)?;

        Self::with_model(model, varmap, training_config, device)
    }
}

impl<M: ModuleT> Trainer<M> {
    /// Create trainer for an already built model whose variables live in `varmap`
    pub fn with_model(
        model: M,
        varmap: VarMap,
        config: TrainingConfig,
        device: Device,
    ) -> crate::Result<Self> {
        config.validate()?;

        let optimizer = Sgd::new(varmap.all_vars(), config.sgd_config())?;

        Ok(Self {
            model,
            varmap,
            optimizer,
            callbacks: Vec::new(),
            config,
            device,
            step: 0,
        })
    }

    /// Register a callback
    pub fn add_callback(&mut self, callback: Box<dyn Callback>) {
        log::debug!("Registered callback {}", callback.name());
        self.callbacks.push(callback);
    }

    /// Training step on one batch; returns (loss, accuracy)
    pub fn train_step(&mut self, inputs: &Tensor, labels: &Tensor) -> crate::Result<(f64, f64)> {
        let logits = self.model.forward_t(inputs, true)?;
        let loss = loss::cross_entropy(&logits, labels)?;

        self.optimizer.backward_step(&loss)?;
        self.step += 1;

        let loss_val = loss.to_dtype(DType::F64)?.to_scalar::<f64>()?;
        let accuracy = accuracy(&logits, labels)?;

        Ok((loss_val, accuracy))
    }

    /// Train for one epoch; returns mean (loss, accuracy) over its batches
    pub fn train_epoch(
        &mut self,
        epoch: usize,
        dataloader: &mut dyn BatchDataLoader,
    ) -> crate::Result<(f64, f64)> {
        let mut total_loss = 0.0;
        let mut total_accuracy = 0.0;
        let mut batch = 0;

        dataloader.reset();

        while let Some((inputs, labels)) = dataloader.next_batch(&self.device)? {
            for callback in self.callbacks.iter_mut() {
                callback.on_batch_begin(batch, &mut self.optimizer)?;
            }

            let (loss, accuracy) = self.train_step(&inputs, &labels)?;
            total_loss += loss;
            total_accuracy += accuracy;
            batch += 1;

            log::debug!("Epoch {} batch {}: loss={:.4}", epoch + 1, batch, loss);

            if self.config.log_every > 0 && self.step % self.config.log_every == 0 {
                log::info!(
                    "Step {}: loss={:.4}, acc={:.4}, lr={:.6}",
                    self.step,
                    loss,
                    accuracy,
                    self.optimizer.learning_rate()
                );
            }
        }

        if batch == 0 {
            return Err(crate::ResNetError::Training(format!(
                "Epoch {} produced no batches",
                epoch + 1
            )));
        }

        Ok((total_loss / batch as f64, total_accuracy / batch as f64))
    }

    /// Mean (loss, accuracy) over a loader, in inference mode
    pub fn evaluate(&self, dataloader: &mut dyn BatchDataLoader) -> crate::Result<(f64, f64)> {
        let mut total_loss = 0.0;
        let mut correct = 0.0;
        let mut seen = 0usize;

        dataloader.reset();

        while let Some((inputs, labels)) = dataloader.next_batch(&self.device)? {
            let n = labels.dim(0)?;
            let logits = self.model.forward_t(&inputs, false)?;
            let loss = loss::cross_entropy(&logits, &labels)?
                .to_dtype(DType::F64)?
                .to_scalar::<f64>()?;

            total_loss += loss * n as f64;
            correct += accuracy(&logits, &labels)? * n as f64;
            seen += n;
        }

        if seen == 0 {
            return Err(crate::ResNetError::Training(
                "Validation loader produced no batches".to_string(),
            ));
        }

        Ok((total_loss / seen as f64, correct / seen as f64))
    }

    /// Full training loop; returns per-epoch logs
    pub fn fit(
        &mut self,
        train: &mut dyn BatchDataLoader,
        mut validation: Option<&mut dyn BatchDataLoader>,
    ) -> crate::Result<Vec<EpochLogs>> {
        let num_epochs = self.config.num_epochs;

        log::info!("Starting training for {} epochs", num_epochs);
        log::info!("Batches per epoch: {}", train.num_batches());

        for callback in self.callbacks.iter_mut() {
            callback.on_train_begin(num_epochs)?;
        }

        let mut history = Vec::with_capacity(num_epochs);

        for epoch in 0..num_epochs {
            for callback in self.callbacks.iter_mut() {
                callback.on_epoch_begin(epoch)?;
            }

            let (loss, accuracy) = self.train_epoch(epoch, train)?;

            let (val_loss, val_accuracy) = match validation.as_deref_mut() {
                Some(loader) => {
                    let (l, a) = self.evaluate(loader)?;
                    (Some(l), Some(a))
                }
                None => (None, None),
            };

            let logs = EpochLogs {
                epoch,
                loss,
                accuracy,
                val_loss,
                val_accuracy,
                lr: self.optimizer.learning_rate(),
            };

            log::info!(
                "Epoch {}/{}: loss={:.4}, acc={:.4}, val_loss={}, val_acc={}, lr={:.6}",
                epoch + 1,
                num_epochs,
                loss,
                accuracy,
                format_metric(val_loss),
                format_metric(val_accuracy),
                logs.lr
            );

            for callback in self.callbacks.iter_mut() {
                callback.on_epoch_end(epoch, &logs, &self.varmap)?;
            }

            history.push(logs);
        }

        for callback in self.callbacks.iter_mut() {
            callback.on_train_end(&history)?;
        }

        let final_path = self.config.final_model_path();
        log::info!("Training complete, saving final model to {}", final_path.display());
        self.save_model(&final_path)?;

        Ok(history)
    }

    /// Save model weights
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        self.varmap.save(path.as_ref())?;
        Ok(())
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn optimizer(&self) -> &Sgd {
        &self.optimizer
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Number of optimizer steps taken
    pub fn step(&self) -> usize {
        self.step
    }
}

/// Fraction of rows whose argmax matches the label
pub fn accuracy(logits: &Tensor, labels: &Tensor) -> candle_core::Result<f64> {
    logits
        .argmax(D::Minus1)?
        .eq(&labels.to_dtype(DType::U32)?)?
        .to_dtype(DType::F64)?
        .mean_all()?
        .to_scalar::<f64>()
}

fn format_metric(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{TensorDataLoader, TensorDataset};
    use crate::training::callback::LearningRateSlot;
    use crate::training::scheduler::WarmupCosineScheduler;
    use std::f64::consts::PI;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        TrainBegin,
        EpochBegin(usize),
        BatchBegin(usize, f64),
        EpochEnd(usize),
        TrainEnd(usize),
    }

    struct Recorder(Arc<Mutex<Vec<Event>>>);

    impl Callback for Recorder {
        fn on_train_begin(&mut self, _num_epochs: usize) -> crate::Result<()> {
            self.0.lock().unwrap().push(Event::TrainBegin);
            Ok(())
        }

        fn on_epoch_begin(&mut self, epoch: usize) -> crate::Result<()> {
            self.0.lock().unwrap().push(Event::EpochBegin(epoch));
            Ok(())
        }

        fn on_batch_begin(
            &mut self,
            batch: usize,
            optimizer: &mut dyn LearningRateSlot,
        ) -> crate::Result<()> {
            self.0.lock().unwrap().push(Event::BatchBegin(batch, optimizer.get_lr()));
            Ok(())
        }

        fn on_epoch_end(&mut self, epoch: usize, _logs: &EpochLogs, _varmap: &VarMap) -> crate::Result<()> {
            self.0.lock().unwrap().push(Event::EpochEnd(epoch));
            Ok(())
        }

        fn on_train_end(&mut self, history: &[EpochLogs]) -> crate::Result<()> {
            self.0.lock().unwrap().push(Event::TrainEnd(history.len()));
            Ok(())
        }
    }

    /// Linear classifier on 2-D points, 4 samples in batches of 2
    fn linear_trainer(config: TrainingConfig) -> crate::Result<(Trainer<candle_nn::Linear>, TensorDataLoader)> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = candle_nn::linear(2, 2, vb.pp("fc"))?;

        let inputs = Tensor::new(&[[1f32, 0.], [0., 1.], [2., 0.], [0., 2.]], &device)?;
        let labels = Tensor::new(&[0u32, 1, 0, 1], &device)?;
        let loader = TensorDataLoader::new(TensorDataset::new(inputs, labels)?, 2, false)?;

        Ok((Trainer::with_model(model, varmap, config, device)?, loader))
    }

    #[test]
    fn test_config_validation() {
        assert!(TrainingConfig::default().validate().is_ok());

        let bad = [
            TrainingConfig { batch_size: 0, ..Default::default() },
            TrainingConfig { warm_up_epochs: 500, ..Default::default() },
            TrainingConfig { base_lr: 0.0, ..Default::default() },
            TrainingConfig { momentum: 1.0, ..Default::default() },
            TrainingConfig { weight_decay: -1.0, ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?} accepted", config);
        }
    }

    #[test]
    fn test_config_from_json_file() -> crate::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("train.json");
        std::fs::write(&path, r#"{ "num_epochs": 20, "warm_up_epochs": 2, "monitor": "val_loss" }"#)?;

        let config = TrainingConfig::from_json_file(&path)?;
        assert_eq!(config.num_epochs, 20);
        assert_eq!(config.monitor, Monitor::ValLoss);
        assert_eq!(config.batch_size, 256);

        let schedule = config.schedule_config(196);
        assert_eq!(schedule.total_epochs, 20);
        assert_eq!(schedule.steps_per_epoch, 196);

        std::fs::write(&path, r#"{ "num_epochs": 2, "warm_up_epochs": 2 }"#)?;
        assert!(TrainingConfig::from_json_file(&path).is_err());

        Ok(())
    }

    #[test]
    fn test_accuracy() -> candle_core::Result<()> {
        let device = Device::Cpu;
        let logits = Tensor::new(&[[2f32, 1.], [0., 3.], [5., 4.], [1., 0.]], &device)?;
        let labels = Tensor::new(&[0u32, 1, 1, 1], &device)?;

        assert!((accuracy(&logits, &labels)? - 0.5).abs() < 1e-12);

        Ok(())
    }

    #[test]
    fn test_fit_drives_scheduler_in_order() -> crate::Result<()> {
        let dir = TempDir::new()?;
        let config = TrainingConfig {
            num_epochs: 3,
            batch_size: 2,
            base_lr: 0.1,
            warm_up_epochs: 1,
            checkpoint_dir: dir.path().join("checkpoints"),
            log_every: 0,
            ..Default::default()
        };

        let (mut trainer, mut loader) = linear_trainer(config.clone())?;
        let steps_per_epoch = loader.num_batches();
        let scheduler = WarmupCosineScheduler::new(config.schedule_config(steps_per_epoch))?;

        let events = Arc::new(Mutex::new(Vec::new()));
        trainer.add_callback(Box::new(scheduler));
        trainer.add_callback(Box::new(Recorder(events.clone())));

        let history = trainer.fit(&mut loader, None)?;
        assert_eq!(history.len(), 3);
        assert_eq!(trainer.step(), 6);

        let cosine = |step: f64| 0.05 * (1.0 + (PI * step / 4.0).cos());
        let expected_rates = [0.0, 0.05, cosine(0.0), cosine(1.0), cosine(2.0), cosine(3.0)];

        let events = events.lock().unwrap().clone();
        let mut expected = vec![Event::TrainBegin];
        for epoch in 0..3 {
            expected.push(Event::EpochBegin(epoch));
            for batch in 0..2 {
                expected.push(Event::BatchBegin(batch, expected_rates[epoch * 2 + batch]));
            }
            expected.push(Event::EpochEnd(epoch));
        }
        expected.push(Event::TrainEnd(3));

        assert_eq!(events.len(), expected.len());
        for (actual, wanted) in events.iter().zip(expected.iter()) {
            match (actual, wanted) {
                (Event::BatchBegin(b, lr), Event::BatchBegin(wb, wlr)) => {
                    assert_eq!(b, wb);
                    assert!((lr - wlr).abs() < 1e-12, "lr {} != {}", lr, wlr);
                }
                _ => assert_eq!(actual, wanted),
            }
        }

        assert!((history[2].lr - cosine(3.0)).abs() < 1e-12);
        assert!(config.final_model_path().exists());

        Ok(())
    }

    #[test]
    fn test_fit_with_validation_and_checkpoint() -> crate::Result<()> {
        use crate::training::checkpoint::BestCheckpoint;

        let dir = TempDir::new()?;
        let config = TrainingConfig {
            num_epochs: 4,
            batch_size: 2,
            base_lr: 0.5,
            warm_up_epochs: 0,
            checkpoint_dir: dir.path().join("checkpoints"),
            monitor: Monitor::ValLoss,
            log_every: 0,
            ..Default::default()
        };

        let (mut trainer, mut loader) = linear_trainer(config.clone())?;
        let (_, mut validation) = linear_trainer(config.clone())?;

        let scheduler = WarmupCosineScheduler::new(config.schedule_config(loader.num_batches()))?;
        trainer.add_callback(Box::new(scheduler));
        trainer.add_callback(Box::new(BestCheckpoint::new(config.best_model_path(), config.monitor)));

        let history = trainer.fit(&mut loader, Some(&mut validation))?;

        for logs in &history {
            let val_loss = logs.val_loss.unwrap();
            let val_accuracy = logs.val_accuracy.unwrap();
            assert!(val_loss.is_finite());
            assert!((0.0..=1.0).contains(&val_accuracy));
        }
        assert!(config.best_model_path().exists());

        Ok(())
    }

    #[test]
    fn test_evaluate_on_empty_loader_fails() -> crate::Result<()> {
        let config = TrainingConfig {
            num_epochs: 2,
            warm_up_epochs: 0,
            ..Default::default()
        };
        let (trainer, _) = linear_trainer(config)?;

        let device = Device::Cpu;
        let empty = TensorDataset::new(
            Tensor::zeros((0, 2), DType::F32, &device)?,
            Tensor::zeros(0, DType::U32, &device)?,
        )?;
        let mut loader = TensorDataLoader::new(empty, 2, false)?;

        assert!(trainer.evaluate(&mut loader).is_err());

        Ok(())
    }

    #[test]
    fn test_resnet_trainer_builds() -> crate::Result<()> {
        let model_config = ResNetConfig {
            stack_num: 1,
            stage_channels: [4, 8, 8],
            ..Default::default()
        };
        let config = TrainingConfig {
            num_epochs: 2,
            warm_up_epochs: 1,
            ..Default::default()
        };

        let mut trainer = Trainer::new(model_config, config, Device::Cpu)?;
        assert!(trainer.optimizer().num_params() > 0);

        let device = Device::Cpu;
        let images = Tensor::randn(0f32, 1.0, (2, 3, 8, 8), &device)?;
        let labels = Tensor::new(&[3u32, 7], &device)?;
        let (loss, _) = trainer.train_step(&images, &labels)?;

        assert!(loss.is_finite());
        assert_eq!(trainer.step(), 1);

        Ok(())
    }
}
