//! 원본 2D 컨볼루션 레이어
//!
//! 계측 래퍼가 읽기 전용으로 참조하는 레이어. 반환값은 항상 이 직접 계산 결과다.

use crate::core::config::Device;
use crate::core::error::{Result, SparsityError};
use ndarray::{Array1, Array4, ArrayView4, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// 패딩 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingMode {
    Zeros,
    Reflect,
    Replicate,
    Circular,
}

impl PaddingMode {
    /// 패딩된 좌표 `idx`가 가리키는 원본 좌표 (0 패딩 영역이면 None)
    fn source_index(self, idx: usize, pad: usize, len: usize) -> Option<usize> {
        let p = idx as isize - pad as isize;
        let n = len as isize;
        let src = match self {
            PaddingMode::Zeros => {
                if p < 0 || p >= n {
                    return None;
                }
                p
            }
            PaddingMode::Reflect => {
                if p < 0 {
                    -p
                } else if p >= n {
                    2 * (n - 1) - p
                } else {
                    p
                }
            }
            PaddingMode::Replicate => p.clamp(0, n - 1),
            PaddingMode::Circular => p.rem_euclid(n),
        };
        Some(src as usize)
    }
}

/// 컨볼루션 구조 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conv2dConfig {
    /// (dh, dw)
    pub stride: (usize, usize),
    /// 대칭 패딩 (ph, pw)
    pub padding: (usize, usize),
    pub groups: usize,
    pub padding_mode: PaddingMode,
}

impl Default for Conv2dConfig {
    fn default() -> Self {
        Self {
            stride: (1, 1),
            padding: (0, 0),
            groups: 1,
            padding_mode: PaddingMode::Zeros,
        }
    }
}

/// 2D 컨볼루션 레이어 (NCHW)
#[derive(Debug, Clone, PartialEq)]
pub struct Conv2d {
    /// [out_channels, in_channels / groups, kh, kw]
    weight: Array4<f32>,
    bias: Option<Array1<f32>>,
    config: Conv2dConfig,
    device: Device,
}

impl Conv2d {
    /// 가중치와 편향으로 레이어 생성
    pub fn from_weights(
        weight: Array4<f32>,
        bias: Option<Array1<f32>>,
        config: Option<Conv2dConfig>,
    ) -> Result<Self> {
        let config = config.unwrap_or_default();
        let (out_channels, in_per_group, kh, kw) = weight.dim();

        if config.groups == 0 {
            return Err(SparsityError::unsupported("groups must be at least 1"));
        }
        if config.stride.0 == 0 || config.stride.1 == 0 {
            return Err(SparsityError::unsupported(format!(
                "stride must be positive, got {:?}",
                config.stride
            )));
        }
        if kh == 0 || kw == 0 || in_per_group == 0 {
            return Err(SparsityError::unsupported(format!(
                "degenerate weight shape {:?}",
                weight.shape()
            )));
        }
        if out_channels % config.groups != 0 {
            return Err(SparsityError::unsupported(format!(
                "out_channels {} not divisible by groups {}",
                out_channels, config.groups
            )));
        }
        if let Some(b) = &bias {
            if b.len() != out_channels {
                return Err(SparsityError::shape("Conv2d bias", out_channels, b.len()));
            }
        }

        Ok(Self {
            weight,
            bias,
            config,
            device: Device::Cpu,
        })
    }

    /// 균등 분포 초기화 (bound = 1 / sqrt(fan_in))
    pub fn random<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        use_bias: bool,
        config: Option<Conv2dConfig>,
        rng: &mut R,
    ) -> Result<Self> {
        let config = config.unwrap_or_default();
        if config.groups == 0 || in_channels % config.groups != 0 {
            return Err(SparsityError::unsupported(format!(
                "in_channels {} not divisible by groups {}",
                in_channels, config.groups
            )));
        }
        let in_per_group = in_channels / config.groups;
        let fan_in = (in_per_group * kernel_size.0 * kernel_size.1).max(1);
        let bound = 1.0 / (fan_in as f32).sqrt();

        let weight = Array4::from_shape_fn(
            (out_channels, in_per_group, kernel_size.0, kernel_size.1),
            |_| rng.gen_range(-bound..bound),
        );
        let bias = use_bias.then(|| Array1::from_shape_fn(out_channels, |_| rng.gen_range(-bound..bound)));

        Self::from_weights(weight, bias, Some(config))
    }

    pub fn weight(&self) -> &Array4<f32> {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Array1<f32>> {
        self.bias.as_ref()
    }

    pub fn config(&self) -> &Conv2dConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn groups(&self) -> usize {
        self.config.groups
    }

    pub fn stride(&self) -> (usize, usize) {
        self.config.stride
    }

    pub fn padding(&self) -> (usize, usize) {
        self.config.padding
    }

    pub fn padding_mode(&self) -> PaddingMode {
        self.config.padding_mode
    }

    pub fn out_channels(&self) -> usize {
        self.weight.dim().0
    }

    pub fn in_channels_per_group(&self) -> usize {
        self.weight.dim().1
    }

    pub fn out_channels_per_group(&self) -> usize {
        self.out_channels() / self.groups()
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels_per_group() * self.groups()
    }

    /// (kh, kw)
    pub fn kernel_size(&self) -> (usize, usize) {
        let (_, _, kh, kw) = self.weight.dim();
        (kh, kw)
    }

    /// 커널 탭 수 kh * kw
    pub fn kk(&self) -> usize {
        let (kh, kw) = self.kernel_size();
        kh * kw
    }

    /// 입력 공간 크기에 대한 출력 공간 크기 (h_out, w_out)
    pub fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let (kh, kw) = self.kernel_size();
        let (ph, pw) = self.padding();
        let (dh, dw) = self.stride();

        let padded_h = height + 2 * ph;
        let padded_w = width + 2 * pw;
        if padded_h < kh {
            return Err(SparsityError::shape("Conv2d padded input height", kh, padded_h));
        }
        if padded_w < kw {
            return Err(SparsityError::shape("Conv2d padded input width", kw, padded_w));
        }

        Ok(((padded_h - kh) / dh + 1, (padded_w - kw) / dw + 1))
    }

    /// 입력 형상 검사 후 출력 공간 크기 반환
    pub fn check_input(&self, input: &ArrayView4<f32>) -> Result<(usize, usize)> {
        let (_, channels, height, width) = input.dim();
        if channels != self.in_channels() {
            return Err(SparsityError::shape("Conv2d input channels", self.in_channels(), channels));
        }

        let (ph, pw) = self.padding();
        let mode = self.padding_mode();
        if mode != PaddingMode::Zeros && (height == 0 || width == 0) {
            return Err(SparsityError::unsupported(format!("{:?} padding over empty input", mode)));
        }
        if mode == PaddingMode::Reflect && (ph >= height || pw >= width) {
            return Err(SparsityError::unsupported(format!(
                "reflect padding {:?} requires input larger than padding, got {}x{}",
                self.padding(),
                height,
                width
            )));
        }

        self.output_size(height, width)
    }

    /// 직접 컨볼루션 (배치 축 병렬)
    pub fn forward(&self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (h_out, w_out) = self.check_input(&input)?;
        let (batch, _, height, width) = input.dim();
        let (out_channels, in_per_group, kh, kw) = self.weight.dim();
        let out_per_group = self.out_channels_per_group();
        let (dh, dw) = self.stride();
        let (ph, pw) = self.padding();
        let mode = self.padding_mode();

        let mut output = Array4::<f32>::zeros((batch, out_channels, h_out, w_out));

        Zip::from(output.outer_iter_mut())
            .and(input.outer_iter())
            .par_for_each(|mut out_b, in_b| {
                for oc in 0..out_channels {
                    let group = oc / out_per_group;
                    let bias = self.bias.as_ref().map_or(0.0, |b| b[oc]);

                    for i in 0..h_out {
                        for j in 0..w_out {
                            let mut acc = 0.0f32;
                            for c in 0..in_per_group {
                                let ic = group * in_per_group + c;
                                for u in 0..kh {
                                    let Some(row) = mode.source_index(i * dh + u, ph, height) else {
                                        continue;
                                    };
                                    for v in 0..kw {
                                        let Some(col) = mode.source_index(j * dw + v, pw, width) else {
                                            continue;
                                        };
                                        acc += in_b[[ic, row, col]] * self.weight[[oc, c, u, v]];
                                    }
                                }
                            }
                            out_b[[oc, i, j]] = acc + bias;
                        }
                    }
                }
            });

        Ok(output)
    }
}
