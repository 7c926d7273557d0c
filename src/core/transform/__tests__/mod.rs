pub mod export_test;

use super::{Layer, Sequential};
use crate::core::conv::{Conv2d, Conv2dConfig};
use ndarray::Array4;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

/// conv(3→4) → relu → conv(4→4, groups 2, stride 2)
pub(crate) fn small_model(seed: u64) -> Sequential {
    let mut rng = StdRng::seed_from_u64(seed);
    let first = Conv2dConfig {
        padding: (1, 1),
        ..Default::default()
    };
    let second = Conv2dConfig {
        stride: (2, 2),
        padding: (1, 1),
        groups: 2,
        ..Default::default()
    };

    let mut model = Sequential::new();
    model
        .push("conv1", Layer::Conv(Arc::new(Conv2d::random(3, 4, (3, 3), true, Some(first), &mut rng).unwrap())))
        .push("relu1", Layer::Relu)
        .push("conv2", Layer::Conv(Arc::new(Conv2d::random(4, 4, (3, 3), false, Some(second), &mut rng).unwrap())));
    model
}

pub(crate) fn relu_input(seed: u64, shape: (usize, usize, usize, usize)) -> Array4<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array4::from_shape_fn(shape, |_| rng.gen_range(-1.0f32..1.0).max(0.0))
}
