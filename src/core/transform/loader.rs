//! 모델 가중치 로더
//!
//! safetensors 파일을 메모리 맵으로 열어 컨볼루션 가중치를 꺼내고,
//! JSON 모델 명세로부터 [`Sequential`] 모델을 조립한다.

use super::model::{Layer, ModelGraph, Sequential};
use crate::core::conv::{Conv2d, Conv2dConfig, PaddingMode};
use anyhow::{bail, Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::info;
use memmap2::Mmap;
use ndarray::{Array1, Array4, ArrayD, IxDyn};
use rand::{rngs::StdRng, SeedableRng};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// safetensors 가중치 로더
pub struct WeightLoader {
    path: PathBuf,
    mmap: Mmap,
}

impl WeightLoader {
    /// safetensors 파일 열기
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).with_context(|| format!("가중치 파일 열기 실패: {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file)? };

        let loader = Self { path, mmap };
        let tensor_count = loader.tensors()?.len();
        info!(
            "가중치 로딩: {} (텐서 {}개, {:.1} MB)",
            loader.path.display(),
            tensor_count,
            loader.mmap.len() as f64 / 1024.0 / 1024.0
        );
        Ok(loader)
    }

    fn tensors(&self) -> Result<SafeTensors<'_>> {
        SafeTensors::deserialize(&self.mmap[..])
            .with_context(|| format!("safetensors 헤더 파싱 실패: {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 텐서 이름 목록 (정렬)
    pub fn names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tensors()?.names().into_iter().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.tensors()?.tensor(name).is_ok())
    }

    /// 텐서를 f32로 변환해 읽음 (F32, F16, BF16)
    pub fn tensor_f32(&self, name: &str) -> Result<ArrayD<f32>> {
        let tensors = self.tensors()?;
        let view = tensors
            .tensor(name)
            .with_context(|| format!("텐서 '{}' 없음", name))?;
        let data = view.data();

        let values: Vec<f32> = match view.dtype() {
            Dtype::F32 => data.chunks_exact(4).map(LittleEndian::read_f32).collect(),
            Dtype::F16 => data
                .chunks_exact(2)
                .map(|chunk| half::f16::from_bits(LittleEndian::read_u16(chunk)).to_f32())
                .collect(),
            Dtype::BF16 => data
                .chunks_exact(2)
                .map(|chunk| half::bf16::from_bits(LittleEndian::read_u16(chunk)).to_f32())
                .collect(),
            other => bail!("지원하지 않는 데이터 타입: {:?} ({})", other, name),
        };

        ArrayD::from_shape_vec(IxDyn(view.shape()), values)
            .with_context(|| format!("텐서 '{}' 형상 오류", name))
    }

    pub fn array4(&self, name: &str) -> Result<Array4<f32>> {
        let tensor = self.tensor_f32(name)?;
        let ndim = tensor.ndim();
        tensor
            .into_dimensionality()
            .with_context(|| format!("텐서 '{}'는 4차원이어야 함 (실제 {}차원)", name, ndim))
    }

    pub fn array1(&self, name: &str) -> Result<Array1<f32>> {
        let tensor = self.tensor_f32(name)?;
        let ndim = tensor.ndim();
        tensor
            .into_dimensionality()
            .with_context(|| format!("텐서 '{}'는 1차원이어야 함 (실제 {}차원)", name, ndim))
    }

    /// `{prefix}.weight`와 (있으면) `{prefix}.bias`로 컨볼루션 생성
    pub fn conv2d(&self, prefix: &str, config: Conv2dConfig) -> Result<Conv2d> {
        let weight = self.array4(&format!("{}.weight", prefix))?;
        let bias_name = format!("{}.bias", prefix);
        let bias = if self.contains(&bias_name)? {
            Some(self.array1(&bias_name)?)
        } else {
            None
        };
        Ok(Conv2d::from_weights(weight, bias, Some(config))?)
    }

    /// 모델의 컨볼루션 가중치를 F32 safetensors 파일로 저장
    pub fn save(model: &Sequential, path: impl AsRef<Path>) -> Result<()> {
        let mut buffers: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();
        for (name, layer) in model.layers() {
            let Some(conv) = layer.conv() else {
                continue;
            };
            buffers.push((format!("{}.weight", name), conv.weight().shape().to_vec(), f32_bytes(conv.weight().iter())));
            if let Some(bias) = conv.bias() {
                buffers.push((format!("{}.bias", name), vec![bias.len()], f32_bytes(bias.iter())));
            }
        }

        let mut views = BTreeMap::new();
        for (name, shape, bytes) in &buffers {
            views.insert(name.clone(), TensorView::new(Dtype::F32, shape.clone(), bytes)?);
        }
        let serialized = safetensors::serialize(&views, &None)?;
        fs::write(path.as_ref(), serialized)?;
        Ok(())
    }
}

fn f32_bytes<'a>(values: impl Iterator<Item = &'a f32>) -> Vec<u8> {
    let values: Vec<f32> = values.copied().collect();
    let mut bytes = vec![0u8; values.len() * 4];
    LittleEndian::write_f32_into(&values, &mut bytes);
    bytes
}

fn default_true() -> bool {
    true
}

/// 레이어 명세
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Conv {
        name: String,
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        #[serde(default)]
        stride: Option<(usize, usize)>,
        #[serde(default)]
        padding: Option<(usize, usize)>,
        #[serde(default)]
        groups: Option<usize>,
        #[serde(default = "default_true")]
        bias: bool,
    },
    Relu {
        name: String,
    },
}

impl LayerSpec {
    fn conv_config(&self) -> Option<Conv2dConfig> {
        match self {
            LayerSpec::Conv {
                stride,
                padding,
                groups,
                ..
            } => Some(Conv2dConfig {
                stride: stride.unwrap_or((1, 1)),
                padding: padding.unwrap_or((0, 0)),
                groups: groups.unwrap_or(1),
                padding_mode: PaddingMode::Zeros,
            }),
            LayerSpec::Relu { .. } => None,
        }
    }
}

/// 순차 모델 명세 (JSON)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    /// 무작위 초기화 시드
    #[serde(default)]
    pub seed: u64,
    pub layers: Vec<LayerSpec>,
}

impl ModelSpec {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("모델 명세 읽기 실패: {}", path.display()))?;
        let spec: Self = serde_json::from_str(&text)?;
        Ok(spec)
    }

    /// 기본 데모 모델 (작은 3단 CNN)
    pub fn demo() -> Self {
        let conv = |name: &str, cin, cout, k, stride, padding, groups| LayerSpec::Conv {
            name: name.to_string(),
            in_channels: cin,
            out_channels: cout,
            kernel_size: (k, k),
            stride: Some((stride, stride)),
            padding: Some((padding, padding)),
            groups: Some(groups),
            bias: true,
        };
        let relu = |name: &str| LayerSpec::Relu { name: name.to_string() };

        Self {
            name: "demo_cnn".to_string(),
            seed: 42,
            layers: vec![
                conv("conv1", 3, 16, 3, 1, 1, 1),
                relu("relu1"),
                conv("conv2", 16, 32, 3, 2, 1, 2),
                relu("relu2"),
                conv("conv3", 32, 32, 1, 1, 0, 1),
                relu("relu3"),
            ],
        }
    }

    /// 첫 컨볼루션의 입력 채널 수
    pub fn input_channels(&self) -> Option<usize> {
        self.layers.iter().find_map(|layer| match layer {
            LayerSpec::Conv { in_channels, .. } => Some(*in_channels),
            LayerSpec::Relu { .. } => None,
        })
    }

    /// 모델 조립 (가중치 파일이 없으면 시드 기반 무작위 초기화)
    pub fn build(&self, weights: Option<&WeightLoader>) -> Result<Sequential> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut model = Sequential::new();

        for spec in &self.layers {
            let config = spec.conv_config();
            match (spec, config) {
                (
                    LayerSpec::Conv {
                        name,
                        in_channels,
                        out_channels,
                        kernel_size,
                        bias,
                        ..
                    },
                    Some(config),
                ) => {
                    let conv = match weights {
                        Some(loader) => {
                            let conv = loader.conv2d(name, config)?;
                            if conv.in_channels() != *in_channels || conv.out_channels() != *out_channels {
                                bail!(
                                    "레이어 '{}' 가중치 형상 불일치: 명세 {}→{}, 파일 {}→{}",
                                    name,
                                    in_channels,
                                    out_channels,
                                    conv.in_channels(),
                                    conv.out_channels()
                                );
                            }
                            conv
                        }
                        None => Conv2d::random(*in_channels, *out_channels, *kernel_size, *bias, Some(config), &mut rng)?,
                    };
                    model.push(name.clone(), Layer::Conv(Arc::new(conv)));
                }
                (LayerSpec::Relu { name }, _) => {
                    model.push(name.clone(), Layer::Relu);
                }
                (LayerSpec::Conv { name, .. }, None) => bail!("레이어 '{}' 설정 누락", name),
            }
        }

        info!("모델 '{}' 조립: 레이어 {}개", self.name, model.len());
        Ok(model)
    }
}
