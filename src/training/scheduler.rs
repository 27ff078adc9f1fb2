/// Cosine learning rate scheduler with linear warmup, driven by epoch/batch hooks
use std::f64::consts::PI;

use super::callback::{Callback, LearningRateSlot};

/// Scheduler configuration, fixed for the whole run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleConfig {
    /// Peak learning rate, reached at the end of warmup
    pub base_lr: f64,
    /// Number of batches per epoch
    pub steps_per_epoch: usize,
    /// Number of epochs spent in linear warmup
    pub warm_up_epochs: usize,
    /// Total number of training epochs (warmup included)
    pub total_epochs: usize,
}

impl ScheduleConfig {
    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if !(self.base_lr.is_finite() && self.base_lr > 0.0) {
            return Err(crate::ResNetError::Config(format!(
                "base_lr must be a positive finite number, got {}",
                self.base_lr
            )));
        }

        if self.steps_per_epoch == 0 {
            return Err(crate::ResNetError::Config(
                "steps_per_epoch must be > 0".to_string(),
            ));
        }

        if self.warm_up_epochs >= self.total_epochs {
            return Err(crate::ResNetError::Config(format!(
                "warm_up_epochs ({}) must be < total_epochs ({})",
                self.warm_up_epochs, self.total_epochs
            )));
        }

        Ok(())
    }

    /// Number of steps in the warmup phase
    pub fn warm_up_steps(&self) -> usize {
        self.steps_per_epoch * self.warm_up_epochs
    }

    /// Number of steps in the cosine phase
    pub fn cosine_steps(&self) -> usize {
        self.steps_per_epoch * (self.total_epochs - self.warm_up_epochs)
    }
}

/// Schedule phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Linear ramp from 0 to `base_lr`
    WarmUp,
    /// Half cosine from `base_lr` down to 0
    CosineDecay,
}

/// Warmup + cosine annealing scheduler
///
/// The epoch hook selects the phase and the step offset inside it; the batch
/// hook turns `batch + offset` into a learning rate and writes it into the
/// optimizer:
/// - warmup: `lr = step * base_lr / (steps_per_epoch * warm_up_epochs)`
/// - cosine: `lr = 0.5 * base_lr * (1 + cos(pi * step / (steps_per_epoch * (total_epochs - warm_up_epochs))))`
///
/// Running past `total_epochs` is not clamped: the cosine argument exceeds pi
/// and the rate climbs back up.
#[derive(Debug, Clone)]
pub struct WarmupCosineScheduler {
    config: ScheduleConfig,
    phase: Phase,
    epoch_offset_steps: usize,
}

impl WarmupCosineScheduler {
    /// Create new scheduler, rejecting configurations that would produce NaN/Inf rates
    pub fn new(config: ScheduleConfig) -> crate::Result<Self> {
        config.validate()?;

        let phase = if config.warm_up_epochs > 0 {
            Phase::WarmUp
        } else {
            Phase::CosineDecay
        };

        Ok(Self {
            config,
            phase,
            epoch_offset_steps: 0,
        })
    }

    /// Enter `epoch`: pick the phase and the number of steps already spent in it
    pub fn on_epoch_begin(&mut self, epoch: usize) {
        let spe = self.config.steps_per_epoch;

        if epoch < self.config.warm_up_epochs {
            self.phase = Phase::WarmUp;
            self.epoch_offset_steps = epoch * spe;
        } else {
            self.phase = Phase::CosineDecay;
            self.epoch_offset_steps = (epoch - self.config.warm_up_epochs) * spe;
        }

        if epoch >= self.config.total_epochs {
            log::warn!(
                "Epoch {} is beyond the scheduled {} epochs; cosine rate is no longer decreasing",
                epoch,
                self.config.total_epochs
            );
        }

        log::debug!(
            "Scheduler epoch {}: phase={:?}, offset={}",
            epoch,
            self.phase,
            self.epoch_offset_steps
        );
    }

    /// Compute the rate for `batch` of the current epoch and push it into the optimizer
    pub fn on_batch_begin(&mut self, batch: usize, optimizer: &mut dyn LearningRateSlot) -> f64 {
        let lr = self.learning_rate(batch);
        optimizer.set_lr(lr);
        lr
    }

    /// Rate for `batch` of the current epoch, without touching the optimizer
    pub fn learning_rate(&self, batch: usize) -> f64 {
        let step = self.global_step(batch) as f64;
        let base_lr = self.config.base_lr;

        match self.phase {
            Phase::WarmUp => step * base_lr / self.config.warm_up_steps() as f64,
            Phase::CosineDecay => {
                let progress = step / self.config.cosine_steps() as f64;
                0.5 * base_lr * (1.0 + (PI * progress).cos())
            }
        }
    }

    /// Steps elapsed in the current phase at `batch`
    pub fn global_step(&self, batch: usize) -> usize {
        batch + self.epoch_offset_steps
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn in_warm_up(&self) -> bool {
        self.phase == Phase::WarmUp
    }

    /// Steps elapsed in the current phase before the current epoch
    pub fn epoch_offset_steps(&self) -> usize {
        self.epoch_offset_steps
    }

    /// Get configuration
    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }
}

impl Callback for WarmupCosineScheduler {
    fn on_epoch_begin(&mut self, epoch: usize) -> crate::Result<()> {
        WarmupCosineScheduler::on_epoch_begin(self, epoch);
        Ok(())
    }

    fn on_batch_begin(
        &mut self,
        batch: usize,
        optimizer: &mut dyn LearningRateSlot,
    ) -> crate::Result<()> {
        WarmupCosineScheduler::on_batch_begin(self, batch, optimizer);
        Ok(())
    }

    fn name(&self) -> &str {
        "WarmupCosineScheduler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::optimizer::{Sgd, SgdConfig};
    use candle_nn::Optimizer;

    fn scenario() -> ScheduleConfig {
        ScheduleConfig {
            base_lr: 0.1,
            steps_per_epoch: 10,
            warm_up_epochs: 2,
            total_epochs: 12,
        }
    }

    fn rate_at(scheduler: &mut WarmupCosineScheduler, epoch: usize, batch: usize) -> f64 {
        scheduler.on_epoch_begin(epoch);
        scheduler.learning_rate(batch)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let zero_steps = ScheduleConfig {
            steps_per_epoch: 0,
            ..scenario()
        };
        assert!(WarmupCosineScheduler::new(zero_steps).is_err());

        let too_much_warmup = ScheduleConfig {
            warm_up_epochs: 12,
            ..scenario()
        };
        assert!(WarmupCosineScheduler::new(too_much_warmup).is_err());

        for base_lr in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            let bad_lr = ScheduleConfig {
                base_lr,
                ..scenario()
            };
            assert!(WarmupCosineScheduler::new(bad_lr).is_err(), "base_lr {} accepted", base_lr);
        }
    }

    #[test]
    fn test_initial_phase() -> crate::Result<()> {
        let scheduler = WarmupCosineScheduler::new(scenario())?;
        assert!(scheduler.in_warm_up());
        assert_eq!(scheduler.epoch_offset_steps(), 0);

        let no_warmup = WarmupCosineScheduler::new(ScheduleConfig {
            warm_up_epochs: 0,
            ..scenario()
        })?;
        assert_eq!(no_warmup.phase(), Phase::CosineDecay);
        assert!((no_warmup.learning_rate(0) - 0.1).abs() < 1e-12);

        Ok(())
    }

    #[test]
    fn test_phase_follows_epoch() -> crate::Result<()> {
        let mut scheduler = WarmupCosineScheduler::new(scenario())?;

        for epoch in 0..12 {
            scheduler.on_epoch_begin(epoch);
            assert_eq!(scheduler.in_warm_up(), epoch < 2, "epoch {}", epoch);
        }

        scheduler.on_epoch_begin(1);
        assert_eq!(scheduler.epoch_offset_steps(), 10);
        scheduler.on_epoch_begin(5);
        assert_eq!(scheduler.epoch_offset_steps(), 30);

        Ok(())
    }

    #[test]
    fn test_concrete_scenario() -> crate::Result<()> {
        let mut scheduler = WarmupCosineScheduler::new(scenario())?;

        assert!((rate_at(&mut scheduler, 0, 5) - 0.025).abs() < 1e-12);
        assert!((rate_at(&mut scheduler, 2, 0) - 0.1).abs() < 1e-12);

        let last = rate_at(&mut scheduler, 11, 9);
        assert_eq!(scheduler.global_step(9), 99);
        let expected = 0.05 * (1.0 + (PI * 0.99).cos());
        assert!((last - expected).abs() < 1e-12);
        assert!((last - 2.467e-5).abs() < 1e-8);

        Ok(())
    }

    #[test]
    fn test_phase_endpoints() -> crate::Result<()> {
        let config = scenario();
        let mut scheduler = WarmupCosineScheduler::new(config)?;

        // Warmup: 0 at the first step, base_lr at steps_per_epoch * warm_up_epochs
        scheduler.on_epoch_begin(0);
        assert_eq!(scheduler.learning_rate(0), 0.0);
        assert!((scheduler.learning_rate(config.warm_up_steps()) - config.base_lr).abs() < 1e-12);

        // Cosine: base_lr at its first step, 0 at its phase length
        scheduler.on_epoch_begin(config.warm_up_epochs);
        assert!((scheduler.learning_rate(0) - config.base_lr).abs() < 1e-12);
        assert!(scheduler.learning_rate(config.cosine_steps()).abs() < 1e-12);

        Ok(())
    }

    #[test]
    fn test_monotonic_within_phases() -> crate::Result<()> {
        let config = scenario();
        let mut scheduler = WarmupCosineScheduler::new(config)?;

        let mut previous = f64::NEG_INFINITY;
        for epoch in 0..config.warm_up_epochs {
            scheduler.on_epoch_begin(epoch);
            for batch in 0..config.steps_per_epoch {
                let lr = scheduler.learning_rate(batch);
                assert!(lr >= previous, "warmup decreased at epoch {} batch {}", epoch, batch);
                previous = lr;
            }
        }

        let mut previous = f64::INFINITY;
        for epoch in config.warm_up_epochs..config.total_epochs {
            scheduler.on_epoch_begin(epoch);
            for batch in 0..config.steps_per_epoch {
                let lr = scheduler.learning_rate(batch);
                assert!(lr <= previous, "cosine increased at epoch {} batch {}", epoch, batch);
                previous = lr;
            }
        }

        Ok(())
    }

    #[test]
    fn test_continuity_at_phase_boundary() -> crate::Result<()> {
        let config = ScheduleConfig {
            base_lr: 0.1,
            steps_per_epoch: 1000,
            warm_up_epochs: 5,
            total_epochs: 100,
        };
        let mut scheduler = WarmupCosineScheduler::new(config)?;

        let last_warmup = rate_at(&mut scheduler, 4, 999);
        let first_cosine = rate_at(&mut scheduler, 5, 0);

        assert!((last_warmup - first_cosine).abs() < 1e-3 * config.base_lr);

        Ok(())
    }

    #[test]
    fn test_epoch_begin_idempotent() -> crate::Result<()> {
        let mut once = WarmupCosineScheduler::new(scenario())?;
        let mut twice = WarmupCosineScheduler::new(scenario())?;

        for epoch in [0, 1, 2, 7] {
            once.on_epoch_begin(epoch);
            twice.on_epoch_begin(epoch);
            twice.on_epoch_begin(epoch);

            assert_eq!(once.phase(), twice.phase());
            assert_eq!(once.epoch_offset_steps(), twice.epoch_offset_steps());
            assert_eq!(once.learning_rate(3), twice.learning_rate(3));
        }

        Ok(())
    }

    #[test]
    fn test_batch_hook_writes_optimizer() -> crate::Result<()> {
        let mut scheduler = WarmupCosineScheduler::new(scenario())?;
        let mut optimizer = Sgd::new(vec![], SgdConfig::default())?;

        scheduler.on_epoch_begin(0);
        let lr = scheduler.on_batch_begin(5, &mut optimizer);

        assert!((lr - 0.025).abs() < 1e-12);
        assert_eq!(optimizer.learning_rate(), lr);

        Ok(())
    }

    #[test]
    fn test_no_clamp_after_total_epochs() -> crate::Result<()> {
        let mut scheduler = WarmupCosineScheduler::new(scenario())?;

        let end = rate_at(&mut scheduler, 11, 9);
        let beyond = rate_at(&mut scheduler, 13, 0);

        assert!(beyond > end);

        Ok(())
    }
}
