//! 이동 평균 축약기
//!
//! 누적합 차분으로 슬라이딩 윈도우 평균을 만들고, 호출 측 버퍼를 비워가며
//! 평활화된 통계 누적기에 흘려보낸다.

use super::streaming::StreamStatistics;
use crate::core::error::{Result, SparsityError};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// 윈도우 평균을 순서대로 내보내는 유한 반복자
///
/// 처음 `window_size - 1`개 위치는 부분 윈도우이므로 내보내지 않는다.
pub struct MovingAverage {
    /// 앞에 0행을 붙인 누적합 [len + 1, channels]
    prefix: Array2<f64>,
    window_size: usize,
    next: usize,
}

impl Iterator for MovingAverage {
    type Item = Array1<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        // prefix[i + 1] - prefix[i + 1 - w] == cumsum[i] - cumsum[i - w]
        let end = self.next + self.window_size;
        if end >= self.prefix.nrows() {
            return None;
        }
        let window_sum = &self.prefix.row(end) - &self.prefix.row(self.next);
        self.next += 1;
        Some(window_sum / self.window_size as f64)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .prefix
            .nrows()
            .saturating_sub(self.next + self.window_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MovingAverage {}

/// 샘플 축(행)을 따라 window_size 크기의 이동 평균
///
/// 정확히 `len - window_size + 1`개의 행을 내보낸다 (len < window_size면 0개).
pub fn moving_average(sequence: ArrayView2<f64>, window_size: usize) -> MovingAverage {
    assert!(window_size >= 1, "moving average window must be at least 1");

    let (len, channels) = sequence.dim();
    let mut prefix = Array2::zeros((len + 1, channels));
    for i in 0..len {
        let next = &prefix.row(i) + &sequence.row(i);
        prefix.row_mut(i + 1).assign(&next);
    }

    MovingAverage {
        prefix,
        window_size,
        next: 0,
    }
}

/// 윈도우를 채우기 전까지 원시 행을 담아두는 버퍼
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingAverageBuffer {
    window_size: usize,
    rows: Array2<f64>,
}

impl MovingAverageBuffer {
    pub fn new(window_size: usize, channel_count: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(SparsityError::unsupported(
                "moving average window size must be at least 1",
            ));
        }
        Ok(Self {
            window_size,
            rows: Array2::zeros((0, channel_count)),
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn channel_count(&self) -> usize {
        self.rows.ncols()
    }

    /// 버퍼에 남아 있는 행 수
    pub fn len(&self) -> usize {
        self.rows.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.nrows() == 0
    }

    /// 새 행을 붙이고, 버퍼가 윈도우보다 길어지면 평균을 `stats`로 흘려보낸다
    ///
    /// 비운 뒤에는 마지막 `window_size - 1`행만 남겨 어떤 윈도우도 두 번 계산되지 않게 한다.
    /// 반환값은 `stats`에 넣은 평균 행 수.
    pub fn push(&mut self, rows: ArrayView2<f64>, stats: &mut StreamStatistics) -> Result<usize> {
        if rows.ncols() != self.channel_count() {
            return Err(SparsityError::shape(
                "MovingAverageBuffer::push",
                self.channel_count(),
                rows.ncols(),
            ));
        }
        if stats.channel_count() != self.channel_count() {
            return Err(SparsityError::shape(
                "MovingAverageBuffer::push (stats)",
                self.channel_count(),
                stats.channel_count(),
            ));
        }

        let width = self.channel_count();
        self.rows
            .append(Axis(0), rows)
            .map_err(|_| SparsityError::shape("MovingAverageBuffer::push", width, rows.ncols()))?;

        if self.rows.nrows() <= self.window_size {
            return Ok(0);
        }

        let averages = moving_average(self.rows.view(), self.window_size);
        let emitted = averages.len();
        let mut batch = Array2::zeros((emitted, width));
        for (mut dst, avg) in batch.rows_mut().into_iter().zip(averages) {
            dst.assign(&avg);
        }
        stats.update(batch.view())?;

        let keep = self.window_size - 1;
        let start = self.rows.nrows() - keep;
        self.rows = self.rows.slice(s![start.., ..]).to_owned();

        Ok(emitted)
    }
}
