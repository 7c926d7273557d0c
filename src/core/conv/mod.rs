//! # 컨볼루션과 패치 재표현
//!
//! 원본 레이어의 직접 계산과, 관측용으로 느리게 다시 계산하는 패치 분해 경로

pub mod layer;
pub mod tiling;
pub mod patches;

// 재수출
pub use layer::{Conv2d, Conv2dConfig, PaddingMode};
pub use tiling::{SpatialBlock, TileGrid};
pub use patches::{PatchExpander, PRODUCT_RANK};

#[cfg(test)]
pub mod __tests__;
