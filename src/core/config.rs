//! # 계측 설정
//!
//! 레이어 계측 시 한 번 정해지는 설정값들

use crate::core::error::{Result, SparsityError};
use crate::core::math::DEFAULT_TILE_FACTOR;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 누적기와 텐서가 놓이는 연산 장치
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Cpu,
    /// 가속기 (장치 ID)
    Cuda(usize),
}

impl Device {
    pub fn is_host(&self) -> bool {
        matches!(self, Device::Cpu)
    }
}

/// 레이어 계측 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// 이동 평균 윈도우 크기 (None이면 이동 평균 추적 안 함)
    pub moving_average_window: Option<usize>,
    /// 입력 희소성 모드의 채널 묶음 크기 (None이면 레이어 전체 비율)
    pub group_size: Option<usize>,
    /// 원시 입력 희소성 추적 여부
    pub track_input_sparsity: bool,
    /// 선호 타일 인자 (1이면 블록 분할 없음)
    pub tile_factor: usize,
    /// 패치 재구성과 직접 컨볼루션 비교 여부
    pub run_reference: bool,
    /// 누적기 장치
    pub device: Device,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            moving_average_window: None,
            group_size: None,
            track_input_sparsity: false,
            tile_factor: DEFAULT_TILE_FACTOR,
            run_reference: false,
            device: Device::Cpu,
        }
    }
}

impl InstrumentConfig {
    pub fn with_moving_average(mut self, window: usize) -> Self {
        self.moving_average_window = Some(window);
        self
    }

    pub fn with_input_sparsity(mut self, group_size: Option<usize>) -> Self {
        self.track_input_sparsity = true;
        self.group_size = group_size;
        self
    }

    pub fn with_tile_factor(mut self, tile_factor: usize) -> Self {
        self.tile_factor = tile_factor;
        self
    }

    pub fn with_reference_check(mut self, enabled: bool) -> Self {
        self.run_reference = enabled;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if self.moving_average_window == Some(0) {
            return Err(SparsityError::unsupported("moving average window must be at least 1"));
        }
        if self.group_size == Some(0) {
            return Err(SparsityError::unsupported("group size must be at least 1"));
        }
        if self.tile_factor == 0 {
            return Err(SparsityError::unsupported("tile factor must be at least 1"));
        }
        if !self.device.is_host() {
            return Err(SparsityError::unsupported(format!(
                "{:?} storage is not available, ndarray accumulators live on the host",
                self.device
            )));
        }
        Ok(())
    }

    /// JSON 파일에서 설정 로드
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}
