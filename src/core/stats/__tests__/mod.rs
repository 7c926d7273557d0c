pub mod streaming_test;

use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// 테스트용 정수형 영 개수 배치
pub(crate) fn random_counts(seed: u64, rows: usize, channels: usize, max: usize) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, channels), |_| rng.gen_range(0..=max) as f64)
}

#[test]
fn 측정기_가중평균_테스트() {
    use super::AverageMeter;

    let mut meter = AverageMeter::new("Layer Sparsity");
    meter.update(0.5, 2);
    meter.update(0.2, 8);

    assert_eq!(meter.count, 10);
    assert!((meter.avg - 0.26).abs() < 1e-12);
    assert!((meter.val - 0.2).abs() < 1e-12);

    meter.reset();
    assert_eq!(meter.count, 0);
    assert_eq!(meter.avg, 0.0);
}
