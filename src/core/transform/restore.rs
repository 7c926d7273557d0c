//! 계측 래퍼 제거

use super::model::{Layer, ModelGraph};
use crate::core::observer::LayerSnapshot;
use log::info;

/// 계측 래퍼를 원본 컨볼루션으로 되돌리고, 떼어낸 누적기 상태를 반환
pub fn restore<M: ModelGraph>(model: &mut M) -> Vec<LayerSnapshot> {
    let mut snapshots = Vec::new();
    for (_, layer) in model.layers_mut() {
        if let Layer::Instrumented(wrapped) = layer {
            snapshots.push(wrapped.snapshot());
            let original = wrapped.original();
            *layer = Layer::Conv(original);
        }
    }

    info!("계측 레이어 {}개 복원", snapshots.len());
    snapshots
}
