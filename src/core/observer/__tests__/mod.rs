
use crate::core::conv::{Conv2d, Conv2dConfig};
use ndarray::Array4;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

/// ReLU를 거친 것 같은 입력 (음수는 0)
pub(crate) fn relu_input(seed: u64, shape: (usize, usize, usize, usize)) -> Array4<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array4::from_shape_fn(shape, |_| rng.gen_range(-1.0f32..1.0).max(0.0))
}

pub(crate) fn random_conv(
    seed: u64,
    in_channels: usize,
    out_channels: usize,
    config: Conv2dConfig,
) -> Arc<Conv2d> {
    let mut rng = StdRng::seed_from_u64(seed);
    Arc::new(Conv2d::random(in_channels, out_channels, (3, 3), true, Some(config), &mut rng).unwrap())
}
