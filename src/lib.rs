//! 컨볼루션 희소성 프로파일러
//!
//! 학습된 CNN의 각 컨볼루션이 보는 입력 패치가 얼마나 비어 있는지를, 모델 출력을
//! 바꾸지 않고 forward마다 스트리밍 통계로 누적하는 라이브러리

pub mod core;

// 핵심 모듈들 재수출
pub use core::{
    // 에러와 설정
    Device, InstrumentConfig, Result, SparsityError,
    // 통계
    StreamStatistics, MovingAverageBuffer, ZeroCountHistogram, AverageMeter,
    // 컨볼루션과 계측
    Conv2d, Conv2dConfig, PaddingMode, InstrumentedConv2d, InputSparsityMonitor, LayerSnapshot,
    // 모델
    instrument, restore, Layer, ModelGraph, Sequential, ModelSpec, WeightLoader,
    export_statistics, SparsityReport, LayerSummary,
};
