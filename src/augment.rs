/// Geometric augmentation for point-cloud examples
///
/// Stateless per-example perturbations applied before batching: a random
/// rotation about the up axis and small clipped gaussian jitter.
use ndarray::{Array2, ArrayView2};
use rand::Rng;
use rand_distr::StandardNormal;

/// Standard deviation of the jitter noise.
pub const JITTER_STDDEV: f32 = 0.01;

/// Per-coordinate clip bound for the jitter noise.
pub const JITTER_CLIP: f32 = 0.05;

/// Randomly rotates a point cloud around the Y (up) axis.
///
/// A single angle is drawn uniformly from `[0, 2π)` and applied to every
/// point, so the shape is rotated rigidly. The rotation matrix is
/// orthonormal with determinant +1.
///
/// # Arguments
/// * `points` - Point cloud of shape `[num_points, 3]`
///
/// # Returns
/// Rotated point cloud with the same shape
pub fn rotate(points: ArrayView2<f32>) -> Array2<f32> {
    let angle = rand::thread_rng().gen_range(0.0..std::f32::consts::TAU);
    rotate_by_angle(points, angle)
}

/// Rotates a point cloud around the Y axis by a fixed angle.
pub fn rotate_by_angle(points: ArrayView2<f32>, angle: f32) -> Array2<f32> {
    let (cos, sin) = (angle.cos(), angle.sin());

    let mut rotated = points.to_owned();
    for mut point in rotated.rows_mut() {
        let (x, z) = (point[0], point[2]);
        point[0] = cos * x + sin * z;
        point[2] = -sin * x + cos * z;
    }
    rotated
}

/// Adds independent clipped gaussian noise to every coordinate.
///
/// Noise is drawn from `N(0, JITTER_STDDEV)` and clipped to
/// `[-JITTER_CLIP, JITTER_CLIP]`, so no coordinate moves further than the
/// clip bound. The magnitude is fixed rather than configurable.
///
/// # Arguments
/// * `points` - Point cloud of shape `[num_points, 3]`
///
/// # Returns
/// Jittered point cloud with the same shape
pub fn jitter(points: ArrayView2<f32>) -> Array2<f32> {
    let mut rng = rand::thread_rng();

    let mut jittered = points.to_owned();
    for value in jittered.iter_mut() {
        let noise: f32 = rng.sample::<f32, _>(StandardNormal) * JITTER_STDDEV;
        *value += noise.clamp(-JITTER_CLIP, JITTER_CLIP);
    }
    jittered
}
