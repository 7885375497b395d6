//! PointNet v1 training for ModelNet40
//!
//! A Rust implementation of the PointNet v1 training pipeline for
//! point-cloud classification on ModelNet40.
//!
//! # Pipeline
//!
//! The crate wires together:
//! - **Dataset**: ModelNet40 point clouds loaded from `.npy` files, with
//!   shuffle/repeat/batch composition
//! - **Augmentation**: random up-axis rotation and clipped gaussian jitter
//! - **Model**: the vanilla PointNet classifier (pointwise MLP encoder,
//!   symmetric max-pool, classification head)
//! - **Training loop**: Adam with staircase learning-rate decay, periodic
//!   evaluation with best-accuracy tracking, scalar summaries
//!
//! # Example
//!
//! ```ignore
//! use pointnet_rs::{TrainFlags, data::ModelNet40Dataset};
//! use pointnet_rs::training::Trainer;
//!
//! let flags = TrainFlags::default();
//! let mut trainer = Trainer::new(flags, device)?;
//! let best = trainer.fit(&mut ds_train, &mut ds_test)?;
//! ```

pub mod augment;
pub mod config;
pub mod data;
pub mod models;
pub mod training;

// Re-export commonly used items
pub use config::TrainFlags;
pub use models::PointNetClassifier;

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum PointNetError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset error: {0}")]
    Data(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PointNetError>;
