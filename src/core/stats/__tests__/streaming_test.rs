use super::super::StreamStatistics;
use super::random_counts;
use crate::core::error::SparsityError;
use approx::assert_relative_eq;
use ndarray::{concatenate, Array1, Array2, Axis};

/// 전체 데이터로 직접 계산한 (평균, 모분산, 표본 공분산)
fn batch_statistics(data: &Array2<f64>) -> (Array1<f64>, Array1<f64>, Array2<f64>) {
    let n = data.nrows() as f64;
    let mean = data.mean_axis(Axis(0)).unwrap();
    let centered = data - &mean;
    let variance = centered.mapv(|v| v * v).sum_axis(Axis(0)) / n;
    let covariance = centered.t().dot(&centered) / (n - 1.0);
    (mean, variance, covariance)
}

fn assert_arrays_close<D: ndarray::Dimension>(a: &ndarray::Array<f64, D>, b: &ndarray::Array<f64, D>) {
    assert_eq!(a.shape(), b.shape());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_relative_eq!(*x, *y, epsilon = 1e-9, max_relative = 1e-5);
    }
}

#[test]
fn 스트리밍_결과_배치_계산_일치_테스트() {
    let batches: Vec<Array2<f64>> = (0..6)
        .map(|i| random_counts(i, 5 + 3 * i as usize, 4, 9))
        .collect();

    let mut stats = StreamStatistics::new(4);
    for batch in &batches {
        stats.update(batch.view()).unwrap();
    }

    let views: Vec<_> = batches.iter().map(|b| b.view()).collect();
    let all = concatenate(Axis(0), &views).unwrap();
    let (mean, variance, covariance) = batch_statistics(&all);

    assert_eq!(stats.count(), all.nrows());
    assert_arrays_close(stats.mean(), &mean);
    assert_arrays_close(&stats.variance(), &variance);
    assert_arrays_close(&stats.covariance(), &covariance);

    println!("✅ 스트리밍 = 배치 통계 테스트 통과 ({}개 샘플)", stats.count());
}

#[test]
fn 배치_분할_순서_무관_테스트() {
    let a = random_counts(11, 7, 3, 9);
    let b = random_counts(12, 13, 3, 9);

    let mut separate = StreamStatistics::new(3);
    separate.update(a.view()).unwrap();
    separate.update(b.view()).unwrap();

    let mut joined = StreamStatistics::new(3);
    let ab = concatenate(Axis(0), &[a.view(), b.view()]).unwrap();
    joined.update(ab.view()).unwrap();

    assert_eq!(separate.count(), joined.count());
    assert_arrays_close(separate.mean(), joined.mean());
    assert_arrays_close(&separate.variance(), &joined.variance());
    assert_arrays_close(&separate.covariance(), &joined.covariance());
    assert_arrays_close(&separate.correlation(), &joined.correlation());
}

#[test]
fn 상관계수_정규화_테스트() {
    let data = random_counts(21, 40, 3, 9);
    let mut stats = StreamStatistics::new(3);
    stats.update(data.view()).unwrap();

    let corr = stats.correlation();
    for c in 0..3 {
        assert_relative_eq!(corr[[c, c]], 1.0, epsilon = 1e-9);
    }
    for x in corr.iter() {
        assert!(*x <= 1.0 + 1e-9 && *x >= -1.0 - 1e-9);
    }
    // 대칭
    assert_relative_eq!(corr[[0, 1]], corr[[1, 0]], epsilon = 1e-12);
}

#[test]
fn 완전_상관_채널_테스트() {
    // 두 번째 채널 = 2 * 첫 번째 채널, 세 번째 = -첫 번째
    let base = random_counts(31, 25, 1, 9);
    let mut data = Array2::zeros((25, 3));
    for i in 0..25 {
        data[[i, 0]] = base[[i, 0]];
        data[[i, 1]] = 2.0 * base[[i, 0]];
        data[[i, 2]] = -base[[i, 0]];
    }

    let mut stats = StreamStatistics::new(3);
    stats.update(data.slice(ndarray::s![..10, ..])).unwrap();
    stats.update(data.slice(ndarray::s![10.., ..])).unwrap();

    let corr = stats.correlation();
    assert_relative_eq!(corr[[0, 1]], 1.0, epsilon = 1e-9);
    assert_relative_eq!(corr[[0, 2]], -1.0, epsilon = 1e-9);
}

#[test]
fn 채널_폭_불일치_테스트() {
    let mut stats = StreamStatistics::new(4);
    stats.update(random_counts(1, 3, 4, 9).view()).unwrap();
    let before = stats.clone();

    let err = stats.update(random_counts(2, 3, 5, 9).view()).unwrap_err();
    assert!(matches!(err, SparsityError::ShapeMismatch { expected: 4, actual: 5, .. }));

    // 실패한 호출은 상태를 바꾸지 않음
    assert_eq!(stats, before);
}

#[test]
fn 빈_배치_무시_테스트() {
    let mut stats = StreamStatistics::new(2);
    stats.update(Array2::<f64>::zeros((0, 2)).view()).unwrap();
    assert_eq!(stats.count(), 0);
    assert!(!stats.has_covariance());
}

#[test]
#[should_panic(expected = "covariance requires at least two samples")]
fn 샘플_부족시_공분산_패닉_테스트() {
    let mut stats = StreamStatistics::new(2);
    stats.update(random_counts(3, 1, 2, 9).view()).unwrap();
    let _ = stats.covariance();
}

#[test]
#[should_panic(expected = "covariance requires at least two samples")]
fn 샘플_부족시_상관계수_패닉_테스트() {
    let stats = StreamStatistics::new(2);
    let _ = stats.correlation();
}

#[test]
fn 누적기_병합_테스트() {
    let a = random_counts(41, 9, 3, 9);
    let b = random_counts(42, 17, 3, 9);

    let mut left = StreamStatistics::new(3);
    left.update(a.view()).unwrap();
    let mut right = StreamStatistics::new(3);
    right.update(b.view()).unwrap();
    left.merge(&right).unwrap();

    let mut reference = StreamStatistics::new(3);
    reference.update(a.view()).unwrap();
    reference.update(b.view()).unwrap();

    assert_eq!(left.count(), reference.count());
    assert_arrays_close(left.mean(), reference.mean());
    assert_arrays_close(&left.variance(), &reference.variance());
    assert_arrays_close(&left.covariance(), &reference.covariance());

    // 빈 누적기와의 병합
    let mut empty = StreamStatistics::new(3);
    empty.merge(&reference).unwrap();
    assert_eq!(empty, reference);

    let err = left.merge(&StreamStatistics::new(2)).unwrap_err();
    assert!(matches!(err, SparsityError::ShapeMismatch { .. }));
}

#[test]
fn 많은_배치_수치_안정성_테스트() {
    // 큰 오프셋 위의 작은 변동
    let mut stats = StreamStatistics::new(2);
    let mut all = Vec::new();
    for i in 0..500u64 {
        let mut batch = random_counts(100 + i, 4, 2, 3);
        batch += 1.0e6;
        all.push(batch.clone());
        stats.update(batch.view()).unwrap();
    }
    let views: Vec<_> = all.iter().map(|b| b.view()).collect();
    let joined = concatenate(Axis(0), &views).unwrap();
    let (_, variance, _) = batch_statistics(&joined);

    for (x, y) in stats.variance().iter().zip(variance.iter()) {
        assert_relative_eq!(*x, *y, max_relative = 1e-6);
    }
}
