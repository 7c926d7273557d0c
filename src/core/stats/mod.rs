//! # 스트리밍 통계
//!
//! 채널별 Welford 누적기, 이동 평균 축약기, 영 탭 히스토그램

pub mod streaming;
pub mod moving_average;
pub mod histogram;
pub mod average_meter;

// 재수출
pub use streaming::StreamStatistics;
pub use moving_average::{moving_average, MovingAverage, MovingAverageBuffer};
pub use histogram::{SparsityRatioHistogram, ZeroCountHistogram, SPARSITY_BINS};
pub use average_meter::AverageMeter;

#[cfg(test)]
pub mod __tests__;
