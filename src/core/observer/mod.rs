//! # 희소성 관측
//!
//! 컨볼루션 레이어를 감싸 forward마다 커널 윈도우 희소성을 누적하는 래퍼와
//! 원시 입력 희소성 모니터

pub mod instrumented;
pub mod input_monitor;

// 재수출
pub use instrumented::{InstrumentedConv2d, LayerSnapshot, MovingAverageTracker, check_reference, REFERENCE_ATOL, REFERENCE_RTOL};
pub use input_monitor::InputSparsityMonitor;

#[cfg(test)]
pub mod __tests__;
