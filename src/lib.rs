//! ResNet image classifier training with a warmup + cosine learning rate schedule
//!
//! The learning rate follows two phases driven by the training loop's
//! epoch and batch hooks:
//! - **Warmup**: linear ramp from 0 to `base_lr` over the first `warm_up_epochs`
//! - **Cosine decay**: half cosine from `base_lr` down to 0 at the last epoch
//!
//! # Example
//!
//! ```ignore
//! use cosine_resnet::{ResNetConfig, Trainer, TrainingConfig, WarmupCosineScheduler};
//!
//! let config = TrainingConfig::default();
//! let mut trainer = Trainer::new(ResNetConfig::default(), config.clone(), device)?;
//! let scheduler = WarmupCosineScheduler::new(config.schedule_config(loader.num_batches()))?;
//! trainer.add_callback(Box::new(scheduler));
//! trainer.fit(&mut loader, Some(&mut validation))?;
//! ```

pub mod config;
pub mod data;
pub mod layers;
pub mod models;
pub mod training;
pub mod utils;

// Re-export commonly used items
pub use config::ResNetConfig;
pub use models::ResNet;
pub use training::{Trainer, TrainingConfig, WarmupCosineScheduler};

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum ResNetError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ResNetError>;
