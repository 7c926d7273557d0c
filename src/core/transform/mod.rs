//! # 모델 변환과 입출력
//!
//! 컨볼루션 계측 치환과 복원, 가중치 로딩, 통계 내보내기, 리포트

pub mod model;
pub mod restore;
pub mod loader;
pub mod export;
pub mod report;

pub use model::{instrument, Layer, ModelGraph, Sequential};
pub use restore::restore;
pub use loader::{LayerSpec, ModelSpec, WeightLoader};
pub use export::{
    apply_snapshots, export_layer, export_statistics, load_snapshots, read_npy, save_snapshots, write_npy,
    NpyElement,
};
pub use report::{LayerSummary, SparsityReport};

#[cfg(test)]
pub mod __tests__;
