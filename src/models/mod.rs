/// PointNet v1 vanilla classifier
///
/// Pointwise feature layers shared across points, a symmetric max-pool to a
/// global shape descriptor, and a fully-connected classification head.
use candle_core::{Result, Tensor, D};
use candle_nn::{batch_norm, linear, loss, ops, BatchNorm, BatchNormConfig, Linear, Module, ModuleT, VarBuilder};

use crate::config::PointNetConfig;

/// Channel widths of the pointwise encoder.
const ENCODER_CHANNELS: [usize; 5] = [64, 64, 64, 128, 1024];

/// Hidden widths of the classification head.
const HEAD_CHANNELS: [usize; 2] = [512, 256];

fn bn_config(momentum: f64) -> BatchNormConfig {
    BatchNormConfig {
        eps: 1e-5,
        remove_mean: true,
        affine: true,
        momentum,
    }
}

/// Shared dense layer applied independently to every point
///
/// Equivalent to a 1x1 convolution over the point axis: dense on the
/// feature dimension, batch norm over batch and points, ReLU.
struct PointwiseLayer {
    dense: Linear,
    bn: BatchNorm,
}

impl PointwiseLayer {
    fn new(in_dim: usize, out_dim: usize, momentum: f64, vb: VarBuilder) -> Result<Self> {
        let dense = linear(in_dim, out_dim, vb.pp("dense"))?;
        let bn = batch_norm(out_dim, bn_config(momentum), vb.pp("bn"))?;
        Ok(Self { dense, bn })
    }

    /// Forward pass over `[batch, points, in_dim]`
    fn forward_t(&self, points: &Tensor, train: bool) -> Result<Tensor> {
        let (batch, num_points, _) = points.dims3()?;
        let features = self.dense.forward(points)?;
        let width = features.dim(D::Minus1)?;

        // Batch norm normalizes the feature axis; fold points into the
        // batch so statistics cover every point of every example.
        let flat = features.reshape((batch * num_points, width))?;
        let normed = self.bn.forward_t(&flat, train)?;
        normed.reshape((batch, num_points, width))?.relu()
    }
}

/// Dense layer of the classification head: linear, batch norm, ReLU
struct DenseLayer {
    dense: Linear,
    bn: BatchNorm,
}

impl DenseLayer {
    fn new(in_dim: usize, out_dim: usize, momentum: f64, vb: VarBuilder) -> Result<Self> {
        let dense = linear(in_dim, out_dim, vb.pp("dense"))?;
        let bn = batch_norm(out_dim, bn_config(momentum), vb.pp("bn"))?;
        Ok(Self { dense, bn })
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let x = self.dense.forward(x)?;
        self.bn.forward_t(&x, train)?.relu()
    }
}

/// Vanilla PointNet encoder: pointwise layers then symmetric max-pool
///
/// Produces one global feature vector per example; the max-pool makes the
/// descriptor invariant to point ordering.
pub struct VanillaEncoder {
    layers: Vec<PointwiseLayer>,
}

impl VanillaEncoder {
    pub fn new(momentum: f64, vb: VarBuilder) -> Result<Self> {
        let mut layers = Vec::with_capacity(ENCODER_CHANNELS.len());
        let mut in_dim = 3;
        for (i, &out_dim) in ENCODER_CHANNELS.iter().enumerate() {
            layers.push(PointwiseLayer::new(
                in_dim,
                out_dim,
                momentum,
                vb.pp(format!("layer_{}", i)),
            )?);
            in_dim = out_dim;
        }
        Ok(Self { layers })
    }

    /// Encode `[batch, points, 3]` into `[batch, 1024]`
    pub fn forward_t(&self, points: &Tensor, train: bool) -> Result<Tensor> {
        let mut features = points.clone();
        for layer in &self.layers {
            features = layer.forward_t(&features, train)?;
        }
        // Symmetric aggregation over the point axis
        features.max(1)
    }
}

/// Classification head over the global feature
pub struct ClassificationHead {
    hidden: Vec<DenseLayer>,
    logits: Linear,
    dropout: f32,
}

impl ClassificationHead {
    pub fn new(config: &PointNetConfig, vb: VarBuilder) -> Result<Self> {
        let mut hidden = Vec::with_capacity(HEAD_CHANNELS.len());
        let mut in_dim = ENCODER_CHANNELS[ENCODER_CHANNELS.len() - 1];
        for (i, &out_dim) in HEAD_CHANNELS.iter().enumerate() {
            hidden.push(DenseLayer::new(
                in_dim,
                out_dim,
                config.bn_momentum,
                vb.pp(format!("dense_{}", i)),
            )?);
            in_dim = out_dim;
        }
        let logits = linear(in_dim, config.num_classes, vb.pp("logits"))?;

        Ok(Self {
            hidden,
            logits,
            dropout: config.dropout,
        })
    }

    /// Map `[batch, 1024]` to logits `[batch, num_classes]`
    pub fn forward_t(&self, global_feature: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = global_feature.clone();
        for layer in &self.hidden {
            x = layer.forward_t(&x, train)?;
        }
        if train && self.dropout > 0.0 {
            x = ops::dropout(&x, self.dropout)?;
        }
        self.logits.forward(&x)
    }
}

/// PointNet vanilla classifier
pub struct PointNetClassifier {
    encoder: VanillaEncoder,
    head: ClassificationHead,
}

impl PointNetClassifier {
    /// Create the classifier under the given variable namespace
    pub fn new(config: &PointNetConfig, vb: VarBuilder) -> Result<Self> {
        let encoder = VanillaEncoder::new(config.bn_momentum, vb.pp("encoder"))?;
        let head = ClassificationHead::new(config, vb.pp("head"))?;
        Ok(Self { encoder, head })
    }

    /// Forward pass: `[batch, points, 3]` to logits `[batch, num_classes]`
    ///
    /// `train` selects batch-statistics normalization and dropout; inference
    /// uses the running statistics and no dropout.
    pub fn forward_t(&self, points: &Tensor, train: bool) -> Result<Tensor> {
        let global_feature = self.encoder.forward_t(points, train)?;
        self.head.forward_t(&global_feature, train)
    }

    /// Sparse softmax cross-entropy loss
    pub fn loss(&self, labels: &Tensor, logits: &Tensor) -> Result<Tensor> {
        loss::cross_entropy(logits, labels)
    }
}
