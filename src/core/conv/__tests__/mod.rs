pub mod layer_test;

use ndarray::Array4;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// 약 절반이 0인 ReLU 이후 같은 활성값
pub(crate) fn relu_input(seed: u64, shape: (usize, usize, usize, usize)) -> Array4<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array4::from_shape_fn(shape, |_| rng.gen_range(-1.0f32..1.0).max(0.0))
}
