//! # 계측 컨볼루션 레이어
//!
//! 원본 [`Conv2d`]를 감싸 forward마다 패치 단위 곱을 관측하고, 커널 윈도우별 영 탭
//! 개수를 히스토그램과 스트리밍 통계에 누적한다. 반환값은 항상 원본 컨볼루션 결과다.
//!
//! 블록별 결과는 지역 버퍼에 모아 두었다가 모든 검사가 끝난 뒤에 한꺼번에 반영한다.
//! 중간에 실패하면 누적기는 호출 이전 상태 그대로다.

use super::input_monitor::InputSparsityMonitor;
use crate::core::config::InstrumentConfig;
use crate::core::conv::{Conv2d, PaddingMode, PatchExpander, PRODUCT_RANK};
use crate::core::error::{Result, SparsityError};
use crate::core::stats::{AverageMeter, MovingAverageBuffer, StreamStatistics, ZeroCountHistogram};
use log::debug;
use ndarray::{Array2, Array4, ArrayView2, ArrayView4, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 참조 검사 절대 허용 오차
pub const REFERENCE_ATOL: f32 = 1e-5;
/// 참조 검사 상대 허용 오차 (직접 컨볼루션 값 기준)
pub const REFERENCE_RTOL: f32 = 1e-5;

/// 패치 재구성 결과가 직접 컨볼루션과 허용 오차 안에서 같은지 검사
///
/// 각 원소에 대해 `|재구성 - 직접| <= atol + rtol * |직접|`.
pub fn check_reference(reconstructed: &Array4<f32>, direct: &Array4<f32>) -> Result<()> {
    if reconstructed.dim() != direct.dim() {
        return Err(SparsityError::shape("reference output", direct.len(), reconstructed.len()));
    }
    let mut max_abs_diff = 0.0f32;
    let mut mismatch = false;
    for (a, b) in reconstructed.iter().zip(direct.iter()) {
        let diff = (a - b).abs();
        max_abs_diff = max_abs_diff.max(diff);
        mismatch |= !(diff <= REFERENCE_ATOL + REFERENCE_RTOL * b.abs());
    }
    if mismatch {
        return Err(SparsityError::ReferenceMismatch { max_abs_diff });
    }
    Ok(())
}

/// 이동 평균 경로: 원시 행 버퍼와 평균 행 통계
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingAverageTracker {
    pub buffer: MovingAverageBuffer,
    pub stats: StreamStatistics,
}

impl MovingAverageTracker {
    pub fn new(window_size: usize, channels: usize) -> Result<Self> {
        Ok(Self {
            buffer: MovingAverageBuffer::new(window_size, channels)?,
            stats: StreamStatistics::new(channels),
        })
    }

    /// 행을 버퍼에 넣고 평균 행 수 반환
    pub fn push(&mut self, rows: ArrayView2<f64>) -> Result<usize> {
        self.buffer.push(rows, &mut self.stats)
    }
}

/// 레이어 누적기 상태 (bincode 저장용)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub name: String,
    pub kk: usize,
    pub ops: usize,
    pub forward_calls: usize,
    pub histogram: Option<ZeroCountHistogram>,
    pub stats: Option<StreamStatistics>,
    pub moving_average: Option<MovingAverageTracker>,
    pub layer_sparsity: AverageMeter,
    pub input_monitor: Option<InputSparsityMonitor>,
}

/// 한 forward 호출에서 모은, 아직 반영되지 않은 관측값
struct StagedObservation {
    /// 정규 (batch, row, col) 순서의 윈도우별 영 탭 개수 [B * h_out * w_out, in_channels]
    zero_counts: Array2<usize>,
    histogram: ZeroCountHistogram,
    product_zeros: usize,
    product_elements: usize,
    reconstructed: Option<Array4<f32>>,
    tile_factor: usize,
    ops: usize,
}

/// 희소성 계측 컨볼루션 래퍼
#[derive(Debug, Clone)]
pub struct InstrumentedConv2d {
    name: String,
    conv: Arc<Conv2d>,
    config: InstrumentConfig,
    kk: usize,
    ops: usize,
    forward_calls: usize,
    histogram: Option<ZeroCountHistogram>,
    stats: Option<StreamStatistics>,
    moving_average: Option<MovingAverageTracker>,
    layer_sparsity: AverageMeter,
    input_monitor: Option<InputSparsityMonitor>,
}

impl InstrumentedConv2d {
    /// 레이어와 설정이 패치 분해 계측에 맞는지 검사
    pub fn check_supported(conv: &Conv2d, config: &InstrumentConfig) -> Result<()> {
        config.validate()?;
        if conv.padding_mode() != PaddingMode::Zeros {
            return Err(SparsityError::unsupported(format!(
                "patch decomposition requires zero padding, layer uses {:?}",
                conv.padding_mode()
            )));
        }
        if conv.device() != config.device {
            return Err(SparsityError::unsupported(format!(
                "layer lives on {:?} but accumulators were requested on {:?}",
                conv.device(),
                config.device
            )));
        }
        Ok(())
    }

    pub fn new(name: impl Into<String>, conv: Arc<Conv2d>, config: InstrumentConfig) -> Result<Self> {
        Self::check_supported(&conv, &config)?;

        let input_monitor = if config.track_input_sparsity {
            InputSparsityMonitor::for_layer(conv.in_channels(), config.group_size)
        } else {
            None
        };

        Ok(Self {
            name: name.into(),
            kk: conv.kk(),
            conv,
            config,
            ops: 0,
            forward_calls: 0,
            histogram: None,
            stats: None,
            moving_average: None,
            layer_sparsity: AverageMeter::new("Layer Sparsity"),
            input_monitor,
        })
    }

    /// 원본 컨볼루션 결과를 반환하면서 희소성 관측
    pub fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let output = self.conv.forward(input)?;
        self.check_accumulators(input.dim().1)?;

        let staged = self.observe(input)?;

        if let Some(reconstructed) = &staged.reconstructed {
            check_reference(reconstructed, &output)?;
        }

        self.commit(input, staged)?;
        Ok(output)
    }

    /// 이미 할당된 누적기와 입력 폭 비교
    fn check_accumulators(&self, channels: usize) -> Result<()> {
        if let Some(histogram) = &self.histogram {
            histogram.check_shape(channels, self.kk)?;
        }
        if let Some(stats) = &self.stats {
            if stats.channel_count() != channels {
                return Err(SparsityError::shape(
                    format!("{} statistics", self.name),
                    stats.channel_count(),
                    channels,
                ));
            }
        }
        if let Some(tracker) = &self.moving_average {
            self.check_tracker(tracker, channels)?;
        }
        Ok(())
    }

    /// 이동 평균 추적기의 윈도우와 채널 폭이 레이어 설정과 맞는지
    fn check_tracker(&self, tracker: &MovingAverageTracker, channels: usize) -> Result<()> {
        if self.config.moving_average_window != Some(tracker.buffer.window_size()) {
            return Err(SparsityError::unsupported(format!(
                "{}: moving average window {} does not match configured {:?}",
                self.name,
                tracker.buffer.window_size(),
                self.config.moving_average_window
            )));
        }
        if tracker.buffer.channel_count() != channels {
            return Err(SparsityError::shape(
                format!("{} moving average buffer", self.name),
                channels,
                tracker.buffer.channel_count(),
            ));
        }
        if tracker.stats.channel_count() != channels {
            return Err(SparsityError::shape(
                format!("{} moving average statistics", self.name),
                channels,
                tracker.stats.channel_count(),
            ));
        }
        Ok(())
    }

    /// 블록별 곱 텐서를 훑어 지역 버퍼에 관측값을 모음
    fn observe(&self, input: ArrayView4<f32>) -> Result<StagedObservation> {
        let expander = PatchExpander::new(&self.conv, input, self.config.tile_factor)?;
        let grid = *expander.grid();
        let (batch, channels, _, _) = input.dim();
        let kk = self.kk;

        let mut zero_counts = Array2::<usize>::zeros((batch * grid.h_out * grid.w_out, channels));
        let mut histogram = ZeroCountHistogram::new(channels, kk);
        let mut product_zeros = 0usize;
        let mut product_elements = 0usize;
        let mut reconstructed = self
            .config
            .run_reference
            .then(|| Array4::<f32>::zeros((batch, self.conv.out_channels(), grid.h_out, grid.w_out)));

        expander.for_each_block(|block, product| {
            product_elements += product.len();
            product_zeros += product.iter().filter(|&&v| v == 0.0).count();
            if let Some(output) = reconstructed.as_mut() {
                expander.reconstruct_block(block, &product, output);
            }

            // [b, i, j, g, o, c, kh, kw] -> [b, i, j, g, o, c, kk]
            let mut collapsed_shape = product.shape()[..PRODUCT_RANK - 2].to_vec();
            collapsed_shape.push(kk);
            let elements = product.len();
            let collapsed = product
                .into_shape(IxDyn(&collapsed_shape))
                .map_err(|_| SparsityError::shape("patch product", elements, collapsed_shape.iter().product()))?;

            let zeros = collapsed.map_axis(Axis(PRODUCT_RANK - 2), |taps| {
                kk - taps.iter().filter(|&&v| v != 0.0).count()
            });

            // 대표 출력 채널 조각 (out/groups = 0), [b, i, j, g, c] -> [b * i * j, g * c]
            let representative = zeros.index_axis(Axis(4), 0);
            let instances = batch * block.rows * block.cols;
            let block_counts = Array2::from_shape_vec(
                (instances, channels),
                representative.iter().copied().collect(),
            )
            .map_err(|_| SparsityError::shape("representative slice", instances * channels, representative.len()))?;

            histogram.accumulate(block_counts.view())?;

            for b in 0..batch {
                for i in 0..block.rows {
                    for j in 0..block.cols {
                        let local = (b * block.rows + i) * block.cols + j;
                        let row = (b * grid.h_out + block.row_start + i) * grid.w_out + block.col_start + j;
                        zero_counts.row_mut(row).assign(&block_counts.row(local));
                    }
                }
            }
            Ok(())
        })?;

        Ok(StagedObservation {
            zero_counts,
            histogram,
            product_zeros,
            product_elements,
            reconstructed,
            tile_factor: grid.factor,
            ops: grid.h_out * grid.w_out * self.conv.out_channels() * self.conv.in_channels_per_group() * kk,
        })
    }

    /// 모인 관측값을 누적기에 반영
    fn commit(&mut self, input: ArrayView4<f32>, staged: StagedObservation) -> Result<()> {
        let (batch, channels, _, _) = input.dim();
        let kk = self.kk;
        let rows = staged.zero_counts.mapv(|z| z as f64);

        // 실패할 수 있는 생성은 누적기를 건드리기 전에
        let fresh_tracker = match (self.config.moving_average_window, &self.moving_average) {
            (Some(window), None) => Some(MovingAverageTracker::new(window, channels)?),
            _ => None,
        };

        self.histogram
            .get_or_insert_with(|| ZeroCountHistogram::new(channels, kk))
            .merge(&staged.histogram)?;
        self.stats
            .get_or_insert_with(|| StreamStatistics::new(channels))
            .update(rows.view())?;

        if fresh_tracker.is_some() {
            self.moving_average = fresh_tracker;
        }
        if let Some(tracker) = self.moving_average.as_mut() {
            tracker.push(rows.view())?;
        }

        if staged.product_elements > 0 {
            self.layer_sparsity
                .update(staged.product_zeros as f64 / staged.product_elements as f64, batch);
        }
        if let Some(monitor) = self.input_monitor.as_mut() {
            monitor.observe(input);
        }

        self.ops = staged.ops;
        self.forward_calls += 1;

        debug!(
            "{}: forward #{} 타일 {}x{}, 윈도우 {}개 관측",
            self.name,
            self.forward_calls,
            staged.tile_factor,
            staged.tile_factor,
            rows.nrows()
        );
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 원본 레이어 참조
    pub fn original(&self) -> Arc<Conv2d> {
        Arc::clone(&self.conv)
    }

    pub fn conv(&self) -> &Conv2d {
        &self.conv
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub fn kk(&self) -> usize {
        self.kk
    }

    /// 마지막 forward의 곱셈 연산 수
    pub fn ops(&self) -> usize {
        self.ops
    }

    pub fn forward_calls(&self) -> usize {
        self.forward_calls
    }

    pub fn histogram(&self) -> Option<&ZeroCountHistogram> {
        self.histogram.as_ref()
    }

    pub fn stats(&self) -> Option<&StreamStatistics> {
        self.stats.as_ref()
    }

    pub fn moving_average(&self) -> Option<&MovingAverageTracker> {
        self.moving_average.as_ref()
    }

    pub fn layer_sparsity(&self) -> &AverageMeter {
        &self.layer_sparsity
    }

    pub fn input_monitor(&self) -> Option<&InputSparsityMonitor> {
        self.input_monitor.as_ref()
    }

    /// 평균 영 탭 개수 (채널 평균들의 평균)
    pub fn average_zeros(&self) -> Option<f64> {
        self.stats
            .as_ref()
            .filter(|stats| stats.count() > 0)
            .map(StreamStatistics::mean_of_means)
    }

    /// 평균 희소성 = 평균 영 탭 개수 / kk
    pub fn average_sparsity(&self) -> Option<f64> {
        self.average_zeros().map(|zeros| zeros / self.kk as f64)
    }

    /// 누적기 상태 복사
    pub fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot {
            name: self.name.clone(),
            kk: self.kk,
            ops: self.ops,
            forward_calls: self.forward_calls,
            histogram: self.histogram.clone(),
            stats: self.stats.clone(),
            moving_average: self.moving_average.clone(),
            layer_sparsity: self.layer_sparsity.clone(),
            input_monitor: self.input_monitor.clone(),
        }
    }

    /// 저장된 누적기 상태로 교체 (이름, kk, 입력 채널 폭이 같아야 함)
    pub fn restore_snapshot(&mut self, snapshot: LayerSnapshot) -> Result<()> {
        if snapshot.name != self.name {
            return Err(SparsityError::unsupported(format!(
                "snapshot for layer '{}' cannot be loaded into '{}'",
                snapshot.name, self.name
            )));
        }
        if snapshot.kk != self.kk {
            return Err(SparsityError::shape(format!("{} snapshot kk", self.name), self.kk, snapshot.kk));
        }
        let channels = self.conv.in_channels();
        if let Some(histogram) = &snapshot.histogram {
            histogram.check_shape(channels, self.kk)?;
        }
        for stats in snapshot
            .stats
            .iter()
            .chain(snapshot.moving_average.as_ref().map(|tracker| &tracker.stats))
        {
            if stats.channel_count() != channels {
                return Err(SparsityError::shape(
                    format!("{} snapshot statistics", self.name),
                    channels,
                    stats.channel_count(),
                ));
            }
        }
        if let Some(tracker) = &snapshot.moving_average {
            self.check_tracker(tracker, channels)?;
        }

        self.ops = snapshot.ops;
        self.forward_calls = snapshot.forward_calls;
        self.histogram = snapshot.histogram;
        self.stats = snapshot.stats;
        self.moving_average = snapshot.moving_average;
        self.layer_sparsity = snapshot.layer_sparsity;
        self.input_monitor = snapshot.input_monitor;
        Ok(())
    }
}
