/// Data loading for PointNet training
pub mod modelnet;

pub use modelnet::{DatasetMetadata, ModelNet40Dataset, ModelNetLoader, Preprocessor, Split};

use candle_core::{Device, Result, Tensor};

/// Generic data loader trait
pub trait BatchDataLoader {
    /// Get next batch of (points, labels) tensors
    fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>>;

    /// Reset loader to the start of the stream
    fn reset(&mut self);

    /// Get total number of batches in the stream
    fn num_batches(&self) -> usize;
}
