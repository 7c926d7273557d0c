//! 원시 입력 희소성 모니터
//!
//! 패치 분해 없이 레이어 입력만 보는 간단한 모드. 채널 묶음 크기가 주어지면
//! 묶음별 영 비율을 10-bin 히스토그램으로, 아니면 레이어 전체 영 비율을 평균낸다.

use crate::core::math::factors;
use crate::core::stats::{AverageMeter, SparsityRatioHistogram};
use log::warn;
use ndarray::ArrayView4;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputSparsityMonitor {
    /// 입력 전체의 영 비율 (배치 크기 가중 평균)
    Overall(AverageMeter),
    /// group_size개 채널 묶음별 영 비율 히스토그램
    Grouped {
        group_size: usize,
        histogram: SparsityRatioHistogram,
    },
}

impl InputSparsityMonitor {
    /// 묶음 크기가 입력 채널 수의 약수인지
    pub fn is_feasible(in_channels: usize, group_size: usize) -> bool {
        in_channels > 0 && factors(in_channels).contains(&group_size)
    }

    /// 레이어용 모니터 생성 (묶음 크기가 맞지 않으면 None)
    pub fn for_layer(in_channels: usize, group_size: Option<usize>) -> Option<Self> {
        match group_size {
            None => Some(InputSparsityMonitor::Overall(AverageMeter::new("Layer Sparsity"))),
            Some(size) if Self::is_feasible(in_channels, size) => Some(InputSparsityMonitor::Grouped {
                group_size: size,
                histogram: SparsityRatioHistogram::new(),
            }),
            Some(size) => {
                warn!(
                    "채널 묶음 크기 {}가 입력 채널 {}을 나누지 않아 입력 희소성 추적을 건너뜀",
                    size, in_channels
                );
                None
            }
        }
    }

    /// 입력 배치 하나 관측
    pub fn observe(&mut self, input: ArrayView4<f32>) {
        match self {
            InputSparsityMonitor::Overall(meter) => {
                let elements = input.len();
                if elements == 0 {
                    return;
                }
                let zeros = input.iter().filter(|&&v| v == 0.0).count();
                meter.update(zeros as f64 / elements as f64, input.dim().0);
            }
            InputSparsityMonitor::Grouped {
                group_size,
                histogram,
            } => {
                // [B, C, H, W] -> [C, B, H, W] -> [group_size, N]
                let transposed = input.permuted_axes([1, 0, 2, 3]);
                let flat: Vec<f32> = transposed.iter().copied().collect();
                let size = *group_size;
                let columns = flat.len() / size;

                let ratios: Vec<f32> = (0..columns)
                    .into_par_iter()
                    .map(|j| {
                        let zeros = (0..size).filter(|&r| flat[r * columns + j] == 0.0).count();
                        zeros as f32 / size as f32
                    })
                    .collect();
                for ratio in ratios {
                    histogram.record(ratio);
                }
            }
        }
    }

    /// 요약용 평균 희소성 (묶음 모드는 bin 중앙값의 가중 평균)
    pub fn average_sparsity(&self) -> Option<f64> {
        match self {
            InputSparsityMonitor::Overall(meter) => (meter.count > 0).then_some(meter.avg),
            InputSparsityMonitor::Grouped { histogram, .. } => {
                let total = histogram.total();
                if total == 0 {
                    return None;
                }
                let edges = histogram.edges();
                let weighted: f64 = histogram
                    .counts()
                    .iter()
                    .enumerate()
                    .map(|(bin, &count)| count as f64 * (edges[bin] + edges[bin + 1]) as f64 / 2.0)
                    .sum();
                Some(weighted / total as f64)
            }
        }
    }
}
