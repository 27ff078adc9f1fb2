/// CIFAR-shaped training run with warmup + cosine learning rate
///
/// Dataset loading is out of scope for the library, so this demo feeds
/// random 32x32 RGB images. Pass a TrainingConfig JSON path as the first
/// argument to override the defaults.
use candle_core::{DType, Device, Tensor};
use cosine_resnet::data::{normalize_channels, TensorDataLoader, TensorDataset, CIFAR10_MEAN, CIFAR10_STD};
use cosine_resnet::training::BestCheckpoint;
use cosine_resnet::{ResNetConfig, Trainer, TrainingConfig, WarmupCosineScheduler};

fn synthetic_split(n: usize, device: &Device) -> anyhow::Result<TensorDataset> {
    let pixels = Tensor::rand(0f32, 255.0, (n, 3, 32, 32), device)?;
    let images = normalize_channels(&pixels, &CIFAR10_MEAN, &CIFAR10_STD)?;
    let labels = Tensor::rand(0f32, 10.0, n, device)?.floor()?.to_dtype(DType::U32)?;
    Ok(TensorDataset::new(images, labels)?)
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let device = if candle_core::utils::cuda_is_available() {
        Device::new_cuda(0)?
    } else {
        Device::Cpu
    };
    log::info!("Using device: {:?}", device);

    let training_config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading training config from {}", path);
            TrainingConfig::from_json_file(path)?
        }
        None => TrainingConfig {
            num_epochs: 10,
            batch_size: 64,
            warm_up_epochs: 2,
            ..Default::default()
        },
    };
    log::info!("Training configuration: {:#?}", training_config);

    let mut train_loader = TensorDataLoader::new(
        synthetic_split(1024, &Device::Cpu)?,
        training_config.batch_size,
        true,
    )?;
    let mut val_loader = TensorDataLoader::new(
        synthetic_split(256, &Device::Cpu)?,
        training_config.batch_size,
        false,
    )?;

    let model_config = ResNetConfig::default();
    log::info!("ResNet-{} for {} classes", model_config.depth(), model_config.num_classes);

    let mut trainer = Trainer::new(model_config, training_config.clone(), device)?;
    log::info!(
        "Parameters: {}",
        cosine_resnet::utils::count_parameters(trainer.varmap())
    );

    let steps_per_epoch = train_loader.num_batches();
    let scheduler = WarmupCosineScheduler::new(training_config.schedule_config(steps_per_epoch))?;
    trainer.add_callback(Box::new(scheduler));
    trainer.add_callback(Box::new(BestCheckpoint::new(
        training_config.best_model_path(),
        training_config.monitor,
    )));

    let history = trainer.fit(&mut train_loader, Some(&mut val_loader))?;

    if let Some(last) = history.last() {
        log::info!(
            "Final epoch: loss={:.4}, val_acc={:.4}",
            last.loss,
            last.val_accuracy.unwrap_or_default()
        );
    }

    Ok(())
}
