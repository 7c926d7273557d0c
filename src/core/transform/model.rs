//! # 모델 그래프와 계측 치환
//!
//! 모델은 이름 붙은 레이어들의 집합이다. 계측은 각 컨볼루션을 [`InstrumentedConv2d`]로
//! 바꿔 끼우는 것이고, 원본 레이어는 `Arc`로 공유되어 복원 시 그대로 돌아간다.

use crate::core::config::InstrumentConfig;
use crate::core::conv::Conv2d;
use crate::core::error::Result;
use crate::core::observer::InstrumentedConv2d;
use log::info;
use ndarray::{Array4, ArrayView4};
use std::sync::Arc;

/// 모델을 구성하는 레이어
#[derive(Debug, Clone)]
pub enum Layer {
    Conv(Arc<Conv2d>),
    Instrumented(Box<InstrumentedConv2d>),
    Relu,
}

impl Layer {
    pub fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        match self {
            Layer::Conv(conv) => conv.forward(input),
            Layer::Instrumented(layer) => layer.forward(input),
            Layer::Relu => Ok(input.mapv(|v| v.max(0.0))),
        }
    }

    /// 레이어 종류 이름 (요약 표용)
    pub fn type_name(&self) -> &'static str {
        match self {
            Layer::Conv(_) | Layer::Instrumented(_) => "Conv2d",
            Layer::Relu => "ReLU",
        }
    }

    pub fn as_instrumented(&self) -> Option<&InstrumentedConv2d> {
        match self {
            Layer::Instrumented(layer) => Some(&**layer),
            _ => None,
        }
    }

    pub fn as_instrumented_mut(&mut self) -> Option<&mut InstrumentedConv2d> {
        match self {
            Layer::Instrumented(layer) => Some(&mut **layer),
            _ => None,
        }
    }

    /// 계측 여부와 관계없이 컨볼루션 참조
    pub fn conv(&self) -> Option<&Conv2d> {
        match self {
            Layer::Conv(conv) => Some(&**conv),
            Layer::Instrumented(layer) => Some(layer.conv()),
            Layer::Relu => None,
        }
    }
}

/// 이름 붙은 레이어를 열거할 수 있는 모델
pub trait ModelGraph {
    fn layers(&self) -> Vec<(&str, &Layer)>;

    fn layers_mut(&mut self) -> Vec<(&str, &mut Layer)>;

    /// 계측된 레이어들 (모델 순서)
    fn instrumented(&self) -> Vec<&InstrumentedConv2d> {
        self.layers()
            .into_iter()
            .filter_map(|(_, layer)| layer.as_instrumented())
            .collect()
    }

    fn instrumented_mut(&mut self) -> Vec<&mut InstrumentedConv2d> {
        self.layers_mut()
            .into_iter()
            .filter_map(|(_, layer)| layer.as_instrumented_mut())
            .collect()
    }
}

/// 순차 모델 (컨볼루션 + ReLU)
#[derive(Debug, Clone, Default)]
pub struct Sequential {
    layers: Vec<(String, Layer)>,
}

impl Sequential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, layer: Layer) -> &mut Self {
        self.layers.push((name.into(), layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|(n, _)| n == name).map(|(_, layer)| layer)
    }

    /// 레이어를 차례로 통과
    pub fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut x = input.to_owned();
        for (_, layer) in self.layers.iter_mut() {
            x = layer.forward(x.view())?;
        }
        Ok(x)
    }
}

impl ModelGraph for Sequential {
    fn layers(&self) -> Vec<(&str, &Layer)> {
        self.layers.iter().map(|(name, layer)| (name.as_str(), layer)).collect()
    }

    fn layers_mut(&mut self) -> Vec<(&str, &mut Layer)> {
        self.layers
            .iter_mut()
            .map(|(name, layer)| (name.as_str(), layer))
            .collect()
    }
}

/// 모든 컨볼루션을 계측 래퍼로 치환하고 치환한 레이어 수 반환
///
/// 모든 레이어를 먼저 검사하므로, 하나라도 지원하지 않으면 모델은 바뀌지 않는다.
pub fn instrument<M: ModelGraph>(model: &mut M, config: &InstrumentConfig) -> Result<usize> {
    for (_, layer) in model.layers() {
        if let Layer::Conv(conv) = layer {
            InstrumentedConv2d::check_supported(conv, config)?;
        }
    }

    let mut replaced = 0;
    for (name, layer) in model.layers_mut() {
        if let Layer::Conv(conv) = layer {
            let wrapped = InstrumentedConv2d::new(name, Arc::clone(conv), config.clone())?;
            *layer = Layer::Instrumented(Box::new(wrapped));
            replaced += 1;
        }
    }

    info!("컨볼루션 레이어 {}개 계측", replaced);
    Ok(replaced)
}
