/// PointNet v1 training on ModelNet40
use candle_core::Device;
use clap::Parser;

use pointnet_rs::config::TrainFlags;
use pointnet_rs::data::{ModelNet40Dataset, ModelNetLoader, Preprocessor, Split};
use pointnet_rs::training::{install_interrupt_handler, Trainer};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let flags = TrainFlags::parse();
    flags.validate()?;

    log::info!("=== PointNet v1 - ModelNet40 Training ===");
    log::info!("Configuration: {:#?}", flags);

    if flags.dry_run {
        log::info!("Dry run requested, exiting");
        return Ok(());
    }

    // Device setup - Try CUDA first, fallback to CPU
    let device = if candle_core::utils::cuda_is_available() {
        Device::new_cuda(0)?
    } else {
        Device::Cpu
    };
    log::info!("Using device: {:?}", device);

    let ds_train = ModelNet40Dataset::from_directory(&flags.data_dir, Split::Train)?;
    let ds_test = ModelNet40Dataset::from_directory(&flags.data_dir, Split::Test)?;

    log::info!("Dataset loaded:");
    log::info!("  - Train examples: {}", ds_train.len());
    log::info!("  - Test examples: {}", ds_test.len());
    log::info!("  - Classes: {}", ds_train.num_classes());
    log::info!("  - Points per example: {}", ds_train.points_per_example());

    let preprocessor = Preprocessor {
        num_points: flags.num_points,
        augment_rotation: flags.augment_rotation,
        augment_jitter: flags.augment_jitter,
    };
    let mut train_loader = ModelNetLoader::new(
        ds_train,
        preprocessor,
        flags.batch_size,
        true,
        flags.num_epochs,
    );
    let mut test_loader =
        ModelNetLoader::for_evaluation(ds_test, flags.num_points, flags.batch_size);

    log::info!("Data loader created:");
    log::info!("  - Batch size: {}", flags.batch_size);
    log::info!("  - Batches per epoch: {}", train_loader.batches_per_epoch());
    log::info!("  - Total batches: {}", train_loader.num_batches());

    install_interrupt_handler()?;

    let mut trainer = Trainer::new(flags, device)?;
    log::info!(
        "Model parameters: ~{:.2}M",
        trainer.num_parameters() as f64 / 1_000_000.0
    );
    log::info!("Summaries: {:?}", trainer.run_dir());
    log::info!("Press Ctrl+C to stop; the run summary is written on exit");

    let best = trainer.fit(&mut train_loader, &mut test_loader)?;

    log::info!("Best test accuracy: {:.4}", best);

    Ok(())
}
