/// ModelNet40 point-cloud dataset (.npy format)
///
/// Expects a directory holding `{split}_points.npy` with shape
/// `[N, points, 3]` and `{split}_labels.npy` with shape `[N]`, plus an
/// optional `dataset.json` metadata file.
use candle_core::{Device, Result, Tensor};
use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};
use ndarray_npy::ReadNpyExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::augment;

/// Dataset split selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn prefix(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

/// Metadata from dataset.json
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetMetadata {
    pub num_classes: usize,
    #[serde(default)]
    pub num_points: usize,
    #[serde(default)]
    pub train_examples: usize,
    #[serde(default)]
    pub test_examples: usize,
    #[serde(default)]
    pub description: String,
}

impl Default for DatasetMetadata {
    fn default() -> Self {
        Self {
            num_classes: 40,
            num_points: crate::config::MAX_POINTS,
            train_examples: 0,
            test_examples: 0,
            description: "ModelNet40".to_string(),
        }
    }
}

/// One split of ModelNet40 loaded from .npy files
pub struct ModelNet40Dataset {
    points: Array3<f32>, // [N, points, 3]
    labels: Array1<u32>, // [N]
    metadata: DatasetMetadata,
}

impl ModelNet40Dataset {
    /// Load a split from a directory containing .npy files and dataset.json
    pub fn from_directory<P: AsRef<Path>>(path: P, split: Split) -> crate::Result<Self> {
        let dir = path.as_ref();

        log::info!("Loading ModelNet40 {} split from: {:?}", split.prefix(), dir);

        // Load metadata
        let metadata_path = dir.join("dataset.json");
        let metadata: DatasetMetadata = if metadata_path.exists() {
            let file = File::open(&metadata_path)?;
            let reader = BufReader::new(file);
            serde_json::from_reader(reader)?
        } else {
            log::warn!("dataset.json not found, using defaults");
            DatasetMetadata::default()
        };

        let points_path = dir.join(format!("{}_points.npy", split.prefix()));
        let points = <Array3<f32> as ReadNpyExt>::read_npy(File::open(&points_path)?)
            .map_err(|e| {
                crate::PointNetError::Data(format!("Failed to read {:?}: {}", points_path, e))
            })?;

        // Labels are stored as i64 by the preparation pipeline
        let labels_path = dir.join(format!("{}_labels.npy", split.prefix()));
        let labels_i64 = <Array1<i64> as ReadNpyExt>::read_npy(File::open(&labels_path)?)
            .map_err(|e| {
                crate::PointNetError::Data(format!("Failed to read {:?}: {}", labels_path, e))
            })?;
        let labels = labels_i64.mapv(|x| x as u32);

        Self::new(points, labels, metadata)
    }

    /// Build a dataset from in-memory arrays, validating shapes
    pub fn new(
        points: Array3<f32>,
        labels: Array1<u32>,
        metadata: DatasetMetadata,
    ) -> crate::Result<Self> {
        if points.shape()[0] != labels.len() {
            return Err(crate::PointNetError::Data(format!(
                "Example count mismatch: {} point clouds, {} labels",
                points.shape()[0],
                labels.len()
            )));
        }

        if points.shape()[2] != 3 {
            return Err(crate::PointNetError::Data(format!(
                "Expected 3D coordinates, got dimension {}",
                points.shape()[2]
            )));
        }

        if let Some(&label) = labels.iter().find(|&&l| l as usize >= metadata.num_classes) {
            return Err(crate::PointNetError::Data(format!(
                "Label {} out of range for {} classes",
                label, metadata.num_classes
            )));
        }

        log::info!(
            "Dataset loaded: {} examples, {} points each, {} classes",
            points.shape()[0],
            points.shape()[1],
            metadata.num_classes
        );

        Ok(Self {
            points,
            labels,
            metadata,
        })
    }

    /// Get number of examples
    pub fn len(&self) -> usize {
        self.points.shape()[0]
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of classes
    pub fn num_classes(&self) -> usize {
        self.metadata.num_classes
    }

    /// Points stored per example
    pub fn points_per_example(&self) -> usize {
        self.points.shape()[1]
    }

    /// Get metadata
    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// Get the point cloud at index
    pub fn get_points(&self, idx: usize) -> ArrayView2<f32> {
        self.points.index_axis(Axis(0), idx)
    }

    /// Get the label at index
    pub fn get_label(&self, idx: usize) -> u32 {
        self.labels[idx]
    }
}

/// Per-example preprocessing applied before batching
///
/// Fixed order: truncate to the point cap, then rotate, then jitter.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    pub num_points: usize,
    pub augment_rotation: bool,
    pub augment_jitter: bool,
}

impl Preprocessor {
    /// Preprocessing for the test split: truncation only
    pub fn inference(num_points: usize) -> Self {
        Self {
            num_points,
            augment_rotation: false,
            augment_jitter: false,
        }
    }

    /// Apply the transform to one example
    pub fn apply(&self, points: ArrayView2<f32>) -> Array2<f32> {
        let keep = self.num_points.min(points.shape()[0]);
        let truncated = points.slice(s![..keep, ..]);

        if self.augment_rotation && self.augment_jitter {
            let rotated = augment::rotate(truncated);
            augment::jitter(rotated.view())
        } else if self.augment_rotation {
            augment::rotate(truncated)
        } else if self.augment_jitter {
            augment::jitter(truncated)
        } else {
            truncated.to_owned()
        }
    }
}

/// Batched loader over a ModelNet40 split
///
/// Composes shuffle (reshuffled each epoch), repeat over `num_epochs`,
/// per-example preprocessing and batching. The final short batch of each
/// epoch is kept.
pub struct ModelNetLoader {
    dataset: ModelNet40Dataset,
    preprocessor: Preprocessor,
    batch_size: usize,
    shuffle: bool,
    num_epochs: usize,
    epoch: usize,
    cursor: usize,
    indices: Vec<usize>,
}

impl ModelNetLoader {
    /// Create a loader over `num_epochs` repeats of the dataset
    pub fn new(
        dataset: ModelNet40Dataset,
        preprocessor: Preprocessor,
        batch_size: usize,
        shuffle: bool,
        num_epochs: usize,
    ) -> Self {
        let num_samples = dataset.len();
        let mut indices: Vec<usize> = (0..num_samples).collect();

        if shuffle {
            use rand::seq::SliceRandom;
            let mut rng = rand::thread_rng();
            indices.shuffle(&mut rng);
        }

        Self {
            dataset,
            preprocessor,
            batch_size,
            shuffle,
            num_epochs,
            epoch: 0,
            cursor: 0,
            indices,
        }
    }

    /// Single-pass loader for evaluation: no shuffle, no augmentation
    pub fn for_evaluation(dataset: ModelNet40Dataset, num_points: usize, batch_size: usize) -> Self {
        Self::new(
            dataset,
            Preprocessor::inference(num_points),
            batch_size,
            false,
            1,
        )
    }

    /// Get next batch of (points, labels)
    pub fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>> {
        if self.cursor >= self.indices.len() {
            // Epoch boundary: advance the repeat counter and reshuffle
            self.epoch += 1;
            if self.epoch >= self.num_epochs || self.indices.is_empty() {
                return Ok(None);
            }
            self.cursor = 0;
            if self.shuffle {
                use rand::seq::SliceRandom;
                let mut rng = rand::thread_rng();
                self.indices.shuffle(&mut rng);
            }
        }

        let end = (self.cursor + self.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.cursor..end];
        let actual_batch_size = batch_indices.len();

        let points_per_example = self
            .preprocessor
            .num_points
            .min(self.dataset.points_per_example());

        let mut points_data = Vec::with_capacity(actual_batch_size * points_per_example * 3);
        let mut label_data = Vec::with_capacity(actual_batch_size);

        for &idx in batch_indices {
            let processed = self.preprocessor.apply(self.dataset.get_points(idx));
            points_data.extend(processed.iter().copied());
            label_data.push(self.dataset.get_label(idx));
        }

        self.cursor = end;

        let points_tensor = Tensor::from_vec(
            points_data,
            (actual_batch_size, points_per_example, 3),
            device,
        )?;
        let labels_tensor = Tensor::from_vec(label_data, (actual_batch_size,), device)?;

        Ok(Some((points_tensor, labels_tensor)))
    }

    /// Reset to the start of the full repeated stream
    pub fn reset(&mut self) {
        self.epoch = 0;
        self.cursor = 0;

        if self.shuffle {
            use rand::seq::SliceRandom;
            let mut rng = rand::thread_rng();
            self.indices.shuffle(&mut rng);
        }
    }

    /// Batches in one pass over the dataset
    pub fn batches_per_epoch(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Total batches across all repeats
    pub fn num_batches(&self) -> usize {
        self.batches_per_epoch() * self.num_epochs
    }

    /// Get dataset reference
    pub fn dataset(&self) -> &ModelNet40Dataset {
        &self.dataset
    }
}

impl super::BatchDataLoader for ModelNetLoader {
    fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>> {
        ModelNetLoader::next_batch(self, device)
    }

    fn reset(&mut self) {
        ModelNetLoader::reset(self)
    }

    fn num_batches(&self) -> usize {
        ModelNetLoader::num_batches(self)
    }
}
