/// Training infrastructure: optimizer, learning rate schedule, callbacks and the training loop
pub mod callback;
pub mod checkpoint;
pub mod optimizer;
pub mod scheduler;
pub mod trainer;

pub use callback::{Callback, EpochLogs, LearningRateSlot};
pub use checkpoint::{BestCheckpoint, CheckpointMetadata, Monitor};
pub use optimizer::{weight_decay_for_l2, Sgd, SgdConfig};
pub use scheduler::{Phase, ScheduleConfig, WarmupCosineScheduler};
pub use trainer::{Trainer, TrainingConfig};
