/// Training loop for the PointNet classifier
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};

use super::scheduler::ExponentialDecay;
use super::summary::SummaryWriter;
use crate::config::{PointNetConfig, TrainFlags};
use crate::data::BatchDataLoader;
use crate::models::PointNetClassifier;

/// Interrupt flag raised by the Ctrl-C handler and polled by the fit loop.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Route Ctrl-C to a cooperative shutdown of the fit loop
pub fn install_interrupt_handler() -> crate::Result<()> {
    ctrlc::set_handler(|| {
        INTERRUPTED.store(true, Ordering::SeqCst);
    })
    .map_err(|e| crate::PointNetError::Training(format!("Failed to set Ctrl-C handler: {}", e)))
}

#[cfg(test)]
fn raise_interrupt() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Mutable state of a training run
///
/// The step counter advances by exactly one per optimization step; the best
/// test accuracy is a high-water mark that never regresses.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub step: usize,
    pub best_accuracy: f32,
}

/// Trainer for the PointNet classifier
pub struct Trainer {
    model: PointNetClassifier,
    varmap: VarMap,
    optimizer: AdamW,
    scheduler: Option<ExponentialDecay>,
    summary: SummaryWriter,
    flags: TrainFlags,
    state: RunState,
    device: Device,
    shutdown_runs: usize,
}

impl Trainer {
    /// Create new trainer
    pub fn new(flags: TrainFlags, device: Device) -> crate::Result<Self> {
        flags.validate()?;

        let model_config = PointNetConfig::from_flags(&flags);
        model_config.validate()?;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = PointNetClassifier::new(&model_config, vb)?;

        let optimizer_params = ParamsAdamW {
            lr: flags.learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        };
        let optimizer = AdamW::new(varmap.all_vars(), optimizer_params)?;

        // Scheduler only exists when decay is enabled; otherwise the
        // optimizer keeps the constant initial rate.
        let scheduler = flags
            .lr_decay
            .then(|| ExponentialDecay::with_initial_lr(flags.learning_rate));

        let summary = SummaryWriter::create(&flags.log_dir)?;
        summary.write_flags(&flags)?;

        Ok(Self {
            model,
            varmap,
            optimizer,
            scheduler,
            summary,
            flags,
            state: RunState::default(),
            device,
            shutdown_runs: 0,
        })
    }

    /// Perform one optimization step on a batch
    ///
    /// Forward pass, loss, gradients and parameter update as one atomic
    /// unit. Advances the step counter and emits the `loss` scalar (and
    /// `learning_rate`, when decay is enabled) every `tb_every` steps.
    pub fn train_step(&mut self, points: &Tensor, labels: &Tensor) -> crate::Result<f32> {
        let logits = self.model.forward_t(points, true)?;
        let loss = self.model.loss(labels, &logits)?;
        let loss_val = loss.to_scalar::<f32>()?;

        if let Some(ref scheduler) = self.scheduler {
            self.optimizer.set_learning_rate(scheduler.get_lr());
        }
        self.optimizer.backward_step(&loss)?;
        if let Some(ref mut scheduler) = self.scheduler {
            scheduler.step();
        }

        self.state.step += 1;

        if self.state.step % self.flags.tb_every == 0 {
            self.summary.scalar("loss", loss_val as f64, self.state.step)?;
            if let Some(ref scheduler) = self.scheduler {
                self.summary
                    .scalar("learning_rate", scheduler.get_lr(), self.state.step)?;
            }
        }

        Ok(loss_val)
    }

    /// Track the best accuracy reached during training
    ///
    /// A cheap no-op returning the stored best unless the step counter sits
    /// on an `ev_every` boundary; then one full inference pass over the test
    /// stream, the high-water mark update and the `accuracy_test` scalar.
    pub fn evaluate(&mut self, test_loader: &mut impl BatchDataLoader) -> crate::Result<f32> {
        if self.state.step % self.flags.ev_every != 0 {
            return Ok(self.state.best_accuracy);
        }

        test_loader.reset();

        let mut correct = 0usize;
        let mut total = 0usize;
        while let Some((points, labels)) = test_loader.next_batch(&self.device)? {
            let logits = self.model.forward_t(&points, false)?;
            let predictions = logits.argmax(D::Minus1)?;
            let matches = predictions
                .eq(&labels)?
                .to_dtype(DType::U32)?
                .sum_all()?
                .to_scalar::<u32>()?;
            correct += matches as usize;
            total += labels.dims()[0];
        }

        let accuracy = if total > 0 {
            correct as f32 / total as f32
        } else {
            0.0
        };

        self.state.best_accuracy = self.state.best_accuracy.max(accuracy);
        self.summary
            .scalar("accuracy_test", accuracy as f64, self.state.step)?;

        log::info!(
            "Step {}: accuracy_test={:.4}, best={:.4}",
            self.state.step,
            accuracy,
            self.state.best_accuracy
        );

        Ok(self.state.best_accuracy)
    }

    /// Drive the full training stream to exhaustion
    ///
    /// One optimization step plus a conditional evaluation per batch.
    /// Ctrl-C breaks the loop cooperatively; the shutdown handler then
    /// writes the final run summary and the loop returns cleanly.
    pub fn fit(
        &mut self,
        train_loader: &mut impl BatchDataLoader,
        test_loader: &mut impl BatchDataLoader,
    ) -> crate::Result<f32> {
        log::info!(
            "Training for {} epochs ({} total batches)",
            self.flags.num_epochs,
            train_loader.num_batches()
        );

        let progress = if self.flags.progress {
            let bar = ProgressBar::new(train_loader.num_batches() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                    .map_err(|e| crate::PointNetError::Training(e.to_string()))?,
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut interrupted = false;
        while let Some((points, labels)) = train_loader.next_batch(&self.device)? {
            if INTERRUPTED.load(Ordering::SeqCst) {
                interrupted = true;
                break;
            }

            self.train_step(&points, &labels)?;
            let best = self.evaluate(test_loader)?;

            progress.set_message(format!("best accuracy: {:.3}", best));
            progress.inc(1);
        }
        progress.finish_and_clear();

        self.shutdown(interrupted)?;

        Ok(self.state.best_accuracy)
    }

    /// Final bookkeeping for the run, invoked at most once per trainer
    fn shutdown(&mut self, interrupted: bool) -> crate::Result<()> {
        self.shutdown_runs += 1;
        if self.shutdown_runs > 1 {
            return Ok(());
        }

        if interrupted {
            log::warn!("Interrupted at step {}, shutting down", self.state.step);
        }
        log::info!(
            "Run finished: {} steps, best accuracy {:.4}",
            self.state.step,
            self.state.best_accuracy
        );

        let flags = self.flags.clone();
        self.summary
            .write_run_summary(&flags, self.state.step, self.state.best_accuracy, interrupted)
    }

    /// Current run state
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Total trainable parameter count
    pub fn num_parameters(&self) -> usize {
        self.varmap
            .all_vars()
            .iter()
            .map(|v| v.as_tensor().elem_count())
            .sum()
    }

    /// Learning rate currently configured on the optimizer
    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    /// Directory holding this run's summaries
    pub fn run_dir(&self) -> &std::path::Path {
        self.summary.run_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DatasetMetadata, ModelNet40Dataset, ModelNetLoader, Preprocessor};
    use ndarray::{Array, Array1};

    fn tiny_dataset(num_examples: usize) -> ModelNet40Dataset {
        let coords = Array::from_shape_fn((num_examples, 8, 3), |(i, j, k)| {
            (i * 31 + j * 7 + k) as f32 * 0.01
        });
        let labels = Array1::from_iter((0..num_examples).map(|i| (i % 4) as u32));
        let metadata = DatasetMetadata {
            num_classes: 40,
            num_points: 8,
            ..DatasetMetadata::default()
        };
        ModelNet40Dataset::new(coords, labels, metadata).unwrap()
    }

    fn tiny_loader(num_examples: usize, batch_size: usize, epochs: usize) -> ModelNetLoader {
        ModelNetLoader::new(
            tiny_dataset(num_examples),
            Preprocessor::inference(8),
            batch_size,
            false,
            epochs,
        )
    }

    fn test_flags(log_dir: &std::path::Path) -> TrainFlags {
        TrainFlags {
            log_dir: log_dir.to_string_lossy().into_owned(),
            batch_size: 2,
            num_epochs: 1,
            num_points: 8,
            lr_decay: false,
            tb_every: 100,
            ev_every: 308,
            augment_rotation: false,
            augment_jitter: false,
            progress: false,
            ..TrainFlags::default()
        }
    }

    #[test]
    fn test_train_step_advances_counter() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut trainer = Trainer::new(test_flags(dir.path()), Device::Cpu)?;
        let mut loader = tiny_loader(4, 2, 1);

        let (points, labels) = loader.next_batch(&Device::Cpu)?.unwrap();
        let loss = trainer.train_step(&points, &labels)?;

        assert_eq!(trainer.state().step, 1);
        assert!(loss.is_finite());

        Ok(())
    }

    #[test]
    fn test_constant_rate_without_decay() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut trainer = Trainer::new(test_flags(dir.path()), Device::Cpu)?;
        let mut loader = tiny_loader(4, 2, 4);

        let initial = trainer.learning_rate();
        for _ in 0..5 {
            let (points, labels) = loader.next_batch(&Device::Cpu)?.unwrap();
            trainer.train_step(&points, &labels)?;
        }

        assert_eq!(trainer.learning_rate(), initial);

        Ok(())
    }

    #[test]
    fn test_decay_follows_schedule() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let flags = TrainFlags {
            lr_decay: true,
            ..test_flags(dir.path())
        };
        let mut trainer = Trainer::new(flags, Device::Cpu)?;
        let mut loader = tiny_loader(4, 2, 2);

        for _ in 0..3 {
            let (points, labels) = loader.next_batch(&Device::Cpu)?.unwrap();
            trainer.train_step(&points, &labels)?;
        }

        // Still inside the first staircase interval
        assert!((trainer.learning_rate() - 1e-3).abs() < 1e-12);

        Ok(())
    }

    #[test]
    fn test_evaluate_skips_off_boundary() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut trainer = Trainer::new(test_flags(dir.path()), Device::Cpu)?;
        let mut train = tiny_loader(4, 2, 1);
        let mut test = tiny_loader(4, 2, 1);

        let (points, labels) = train.next_batch(&Device::Cpu)?.unwrap();
        trainer.train_step(&points, &labels)?;

        // step = 1, ev_every = 308: cheap no-op returning the prior value,
        // without consuming the test stream
        let best = trainer.evaluate(&mut test)?;
        assert_eq!(best, 0.0);
        assert!(test.next_batch(&Device::Cpu)?.is_some());

        Ok(())
    }

    #[test]
    fn test_evaluate_high_water_mark() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let flags = TrainFlags {
            ev_every: 1,
            ..test_flags(dir.path())
        };
        let mut trainer = Trainer::new(flags, Device::Cpu)?;
        let mut train = tiny_loader(4, 2, 8);
        let mut test = tiny_loader(4, 2, 1);

        let mut previous_best = 0.0f32;
        for _ in 0..4 {
            let (points, labels) = train.next_batch(&Device::Cpu)?.unwrap();
            trainer.train_step(&points, &labels)?;
            let best = trainer.evaluate(&mut test)?;
            assert!(best >= previous_best);
            previous_best = best;
        }

        Ok(())
    }

    #[test]
    fn test_loss_logged_once_per_interval() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut trainer = Trainer::new(test_flags(dir.path()), Device::Cpu)?;
        let mut loader = tiny_loader(4, 2, 50);

        for _ in 0..100 {
            let (points, labels) = loader.next_batch(&Device::Cpu)?.unwrap();
            trainer.train_step(&points, &labels)?;
        }

        let run_dir = trainer.run_dir().to_path_buf();
        trainer.shutdown(false)?;

        let contents = std::fs::read_to_string(run_dir.join("scalars.csv"))?;
        let loss_rows: Vec<&str> = contents
            .lines()
            .filter(|l| l.contains(",loss,"))
            .collect();
        assert_eq!(loss_rows.len(), 1);
        assert!(loss_rows[0].starts_with("100,loss,"));

        // No decay: no learning_rate entries either
        assert!(!contents.contains(",learning_rate,"));

        Ok(())
    }

    #[test]
    fn test_fit_completes_and_handles_interrupt() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let flags = TrainFlags {
            ev_every: 2,
            ..test_flags(dir.path())
        };
        let mut trainer = Trainer::new(flags, Device::Cpu)?;
        let mut train = tiny_loader(4, 2, 2);
        let mut test = tiny_loader(4, 2, 1);

        INTERRUPTED.store(false, Ordering::SeqCst);
        let best = trainer.fit(&mut train, &mut test)?;
        assert_eq!(trainer.state().step, 4);
        assert!(best >= 0.0);
        assert_eq!(trainer.shutdown_runs, 1);
        assert!(trainer.run_dir().join("run_summary.json").exists());

        // A raised interrupt stops the next fit before its first step and
        // still shuts down cleanly, exactly once.
        let dir2 = tempfile::tempdir()?;
        let flags2 = TrainFlags {
            ev_every: 2,
            ..test_flags(dir2.path())
        };
        let mut trainer2 = Trainer::new(flags2, Device::Cpu)?;
        let mut train2 = tiny_loader(4, 2, 2);
        raise_interrupt();
        let result = trainer2.fit(&mut train2, &mut test);
        INTERRUPTED.store(false, Ordering::SeqCst);

        assert!(result.is_ok());
        assert_eq!(trainer2.state().step, 0);
        assert_eq!(trainer2.shutdown_runs, 1);

        let raw = std::fs::read_to_string(trainer2.run_dir().join("run_summary.json"))?;
        let parsed: serde_json::Value = serde_json::from_str(&raw)?;
        assert_eq!(parsed["interrupted"], true);

        Ok(())
    }
}
