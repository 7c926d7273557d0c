//! 영(0) 탭 개수 히스토그램

use crate::core::error::{Result, SparsityError};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// 채널별 영 탭 개수 히스토그램 [channels, kk + 1]
///
/// bin `b`는 정확히 `b`개의 탭이 0인 커널 윈도우 인스턴스 수다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroCountHistogram {
    kk: usize,
    bins: Array2<u64>,
}

impl ZeroCountHistogram {
    pub fn new(channels: usize, kk: usize) -> Self {
        Self {
            kk,
            bins: Array2::zeros((channels, kk + 1)),
        }
    }

    pub fn channels(&self) -> usize {
        self.bins.nrows()
    }

    /// 커널 탭 수
    pub fn kk(&self) -> usize {
        self.kk
    }

    pub fn bins(&self) -> &Array2<u64> {
        &self.bins
    }

    /// 같은 형상의 히스토그램인지 확인
    pub fn check_shape(&self, channels: usize, kk: usize) -> Result<()> {
        if channels != self.channels() {
            return Err(SparsityError::shape("ZeroCountHistogram channels", self.channels(), channels));
        }
        if kk != self.kk {
            return Err(SparsityError::shape("ZeroCountHistogram kk", self.kk, kk));
        }
        Ok(())
    }

    /// 인스턴스별 영 탭 개수 [instances, channels]를 원-핫으로 누적
    pub fn accumulate(&mut self, zero_counts: ArrayView2<usize>) -> Result<()> {
        if zero_counts.ncols() != self.channels() {
            return Err(SparsityError::shape(
                "ZeroCountHistogram::accumulate",
                self.channels(),
                zero_counts.ncols(),
            ));
        }
        if let Some(&bad) = zero_counts.iter().find(|&&z| z > self.kk) {
            return Err(SparsityError::shape("ZeroCountHistogram bin", self.kk, bad));
        }

        for row in zero_counts.rows() {
            for (channel, &zeros) in row.iter().enumerate() {
                self.bins[[channel, zeros]] += 1;
            }
        }
        Ok(())
    }

    /// 같은 형상의 히스토그램을 더함
    pub fn merge(&mut self, other: &ZeroCountHistogram) -> Result<()> {
        self.check_shape(other.channels(), other.kk)?;
        self.bins += &other.bins;
        Ok(())
    }

    /// 채널별 관측 인스턴스 수 (bin 합)
    pub fn channel_totals(&self) -> Array1<u64> {
        self.bins.sum_axis(Axis(1))
    }

    /// 전체 bin 합
    pub fn total(&self) -> u64 {
        self.bins.sum()
    }

    /// 모든 탭이 0인 윈도우 비율 (마지막 bin 합 / 전체)
    pub fn all_zero_fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.bins.column(self.kk).sum() as f64 / total as f64
    }
}

/// 입력 희소성 비율 히스토그램의 bin 수
pub const SPARSITY_BINS: usize = 10;

/// [0, 1] 구간을 균등하게 나눈 희소성 비율 히스토그램 (마지막 bin은 닫힌 구간)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparsityRatioHistogram {
    edges: Vec<f32>,
    counts: Vec<u64>,
}

impl Default for SparsityRatioHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl SparsityRatioHistogram {
    pub fn new() -> Self {
        let edges = (0..=SPARSITY_BINS)
            .map(|i| i as f32 / SPARSITY_BINS as f32)
            .collect();
        Self {
            edges,
            counts: vec![0; SPARSITY_BINS],
        }
    }

    /// 비율 하나를 해당 bin에 넣음 (구간 밖 값은 무시)
    pub fn record(&mut self, ratio: f32) {
        let last = SPARSITY_BINS;
        if !(ratio >= self.edges[0] && ratio <= self.edges[last]) {
            return;
        }
        let bin = self.edges.partition_point(|&edge| edge <= ratio).saturating_sub(1);
        self.counts[bin.min(last - 1)] += 1;
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn edges(&self) -> &[f32] {
        &self.edges
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}
