//! # 컨볼루션 희소성 계측 핵심 모듈
//!
//! 컨볼루션 레이어를 감싸 커널 윈도우 단위 영(0) 탭 분포를 스트리밍으로 누적한다

pub mod error;
pub mod config;
pub mod math;
pub mod stats;
pub mod conv;
pub mod observer;
pub mod transform;

// 주요 타입들 재수출
pub use error::{Result, SparsityError};
pub use config::{Device, InstrumentConfig};
pub use stats::*;
pub use conv::*;
pub use observer::*;
pub use transform::*;
