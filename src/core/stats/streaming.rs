//! 다채널 스트리밍 통계 (Welford 확장)
//!
//! 배치 단위로 평균/분산/공분산/상관계수를 갱신하며 원본 샘플은 보관하지 않는다.

use crate::core::error::{Result, SparsityError};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// 채널별 스트리밍 통계 누적기
///
/// `m2`는 정규화 전 분산 누적값, `comoment`는 정규화 전 공분산 누적값이다.
/// 분산/공분산/상관계수는 읽을 때 계산한다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatistics {
    count: usize,
    channel_count: usize,
    mean: Array1<f64>,
    m2: Array1<f64>,
    comoment: Array2<f64>,
}

impl StreamStatistics {
    /// 채널 폭이 고정된 새 누적기
    pub fn new(channel_count: usize) -> Self {
        Self {
            count: 0,
            channel_count,
            mean: Array1::zeros(channel_count),
            m2: Array1::zeros(channel_count),
            comoment: Array2::zeros((channel_count, channel_count)),
        }
    }

    /// 배치 하나로 통계 갱신
    ///
    /// `batch`의 각 행은 `channel_count` 길이의 벡터다. 폭이 다르면 아무것도 바꾸지 않고
    /// `ShapeMismatch`를 반환한다.
    pub fn update(&mut self, batch: ArrayView2<f64>) -> Result<()> {
        if batch.ncols() != self.channel_count {
            return Err(SparsityError::shape(
                "StreamStatistics::update",
                self.channel_count,
                batch.ncols(),
            ));
        }
        if batch.nrows() == 0 {
            return Ok(());
        }

        self.count += batch.nrows();
        let n = self.count as f64;

        let delta = &batch - &self.mean;
        self.mean += &(&delta / n).sum_axis(Axis(0));
        let delta2 = &batch - &self.mean;

        self.m2 += &(&delta * &delta2).sum_axis(Axis(0));
        self.comoment += &delta.t().dot(&delta2);

        Ok(())
    }

    /// 다른 누적기를 병합 (Chan 쌍별 갱신)
    pub fn merge(&mut self, other: &StreamStatistics) -> Result<()> {
        if other.channel_count != self.channel_count {
            return Err(SparsityError::shape(
                "StreamStatistics::merge",
                self.channel_count,
                other.channel_count,
            ));
        }
        if other.count == 0 {
            return Ok(());
        }
        if self.count == 0 {
            *self = other.clone();
            return Ok(());
        }

        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let n = n_a + n_b;
        let delta = &other.mean - &self.mean;
        let weight = n_a * n_b / n;

        let outer = delta
            .view()
            .insert_axis(Axis(1))
            .dot(&delta.view().insert_axis(Axis(0)));

        self.m2 = &self.m2 + &other.m2 + &(&delta * &delta * weight);
        self.comoment = &self.comoment + &other.comoment + &(outer * weight);
        self.mean = &self.mean + &(&delta * (n_b / n));
        self.count += other.count;

        Ok(())
    }

    /// 채널당 관측된 샘플 수
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// 공분산/상관계수를 읽을 수 있는지 (count > 1)
    pub fn has_covariance(&self) -> bool {
        self.count > 1
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// 모분산 (var_acc / count)
    pub fn variance(&self) -> Array1<f64> {
        assert!(self.count > 0, "variance requested before any sample was observed");
        &self.m2 / self.count as f64
    }

    /// 표본 공분산 (cov_acc / (count - 1))
    ///
    /// # Panics
    ///
    /// 샘플이 두 개 미만이면 패닉한다.
    pub fn covariance(&self) -> Array2<f64> {
        assert!(
            self.count > 1,
            "covariance requires at least two samples, got {}",
            self.count
        );
        &self.comoment / (self.count - 1) as f64
    }

    /// 상관계수 행렬
    ///
    /// 분산이 0인 채널과 얽힌 항목은 NaN이 된다.
    ///
    /// # Panics
    ///
    /// 샘플이 두 개 미만이면 패닉한다.
    pub fn correlation(&self) -> Array2<f64> {
        let covariance = self.covariance();
        let variance = self.variance();
        let n = self.count as f64;

        let outer = variance
            .view()
            .insert_axis(Axis(1))
            .dot(&variance.view().insert_axis(Axis(0)));

        covariance / &outer.mapv(f64::sqrt) * ((n - 1.0) / n)
    }

    /// 전 채널 평균의 평균
    pub fn mean_of_means(&self) -> f64 {
        self.mean.mean().unwrap_or(0.0)
    }
}
