/// Configuration surface for PointNet training
///
/// Mirrors the flag set of the original PointNet v1 training setup. Parsed
/// once at startup and never mutated afterwards.
use clap::Parser;

/// Maximum number of points stored per ModelNet40 example.
pub const MAX_POINTS: usize = 2048;

#[derive(Debug, Clone, Parser, serde::Serialize, serde::Deserialize)]
#[command(name = "train", about = "Train PointNet v1 on ModelNet40")]
pub struct TrainFlags {
    /// Directory containing the ModelNet40 .npy split files
    #[arg(long, default_value = "data/modelnet40")]
    pub data_dir: String,

    /// Parent directory for per-run summaries
    #[arg(long, default_value = "runs")]
    pub log_dir: String,

    /// Examples per optimization step
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Number of passes over the training split
    #[arg(long, default_value_t = 250)]
    pub num_epochs: usize,

    /// Points kept per example, subsampled by truncation (max 2048)
    #[arg(long, default_value_t = 2048)]
    pub num_points: usize,

    /// Initial Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub learning_rate: f64,

    /// Enable staircase exponential learning-rate decay
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub lr_decay: bool,

    /// Batch norm decay momentum, passed to the model at construction
    #[arg(long, default_value_t = 0.5)]
    pub bn_decay: f64,

    /// Iterations between loss / learning-rate scalar summaries
    #[arg(long, default_value_t = 100)]
    pub tb_every: usize,

    /// Iterations between evaluation passes over the test split
    #[arg(long, default_value_t = 308)]
    pub ev_every: usize,

    /// Apply random rotation augmentation
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub augment_rotation: bool,

    /// Apply random jitter augmentation
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub augment_jitter: bool,

    /// Show the progress bar
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub progress: bool,

    /// Parse and report the configuration, then exit without training
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

impl Default for TrainFlags {
    fn default() -> Self {
        Self {
            data_dir: "data/modelnet40".to_string(),
            log_dir: "runs".to_string(),
            batch_size: 32,
            num_epochs: 250,
            num_points: 2048,
            learning_rate: 1e-3,
            lr_decay: true,
            bn_decay: 0.5,
            tb_every: 100,
            ev_every: 308,
            augment_rotation: true,
            augment_jitter: true,
            progress: true,
            dry_run: false,
        }
    }
}

impl TrainFlags {
    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch_size == 0 {
            return Err(crate::PointNetError::Config(
                "batch_size must be > 0".to_string(),
            ));
        }

        if self.num_points == 0 || self.num_points > MAX_POINTS {
            return Err(crate::PointNetError::Config(format!(
                "num_points must be in 1..={}, got {}",
                MAX_POINTS, self.num_points
            )));
        }

        if self.learning_rate <= 0.0 {
            return Err(crate::PointNetError::Config(
                "learning_rate must be > 0".to_string(),
            ));
        }

        if self.bn_decay <= 0.0 || self.bn_decay > 1.0 {
            return Err(crate::PointNetError::Config(format!(
                "bn_decay must be in (0, 1], got {}",
                self.bn_decay
            )));
        }

        if self.tb_every == 0 || self.ev_every == 0 {
            return Err(crate::PointNetError::Config(
                "tb_every and ev_every must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration for the PointNet classifier
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PointNetConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Batch norm momentum applied to running statistics
    pub bn_momentum: f64,

    /// Dropout probability in the classification head
    pub dropout: f32,
}

impl Default for PointNetConfig {
    fn default() -> Self {
        Self {
            num_classes: 40,
            bn_momentum: 0.5,
            dropout: 0.3,
        }
    }
}

impl PointNetConfig {
    /// Derive the model configuration from the training flags
    pub fn from_flags(flags: &TrainFlags) -> Self {
        Self {
            bn_momentum: flags.bn_decay,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.num_classes == 0 {
            return Err(crate::PointNetError::Config(
                "num_classes must be > 0".to_string(),
            ));
        }

        if self.bn_momentum <= 0.0 || self.bn_momentum > 1.0 {
            return Err(crate::PointNetError::Config(format!(
                "bn_momentum must be in (0, 1], got {}",
                self.bn_momentum
            )));
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(crate::PointNetError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }

        Ok(())
    }
}
