//! 희소성 계측 에러 타입

use thiserror::Error;

/// 계측 과정에서 발생하는 에러
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SparsityError {
    /// 채널 폭이나 텐서 형상이 기존 누적기와 맞지 않음
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// 패치 분해가 정의되지 않는 레이어 설정
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// 참조 검사 모드에서 패치 재구성이 원본 컨볼루션과 다름
    #[error("Patch reconstruction differs from direct convolution (max abs diff {max_abs_diff:.3e})")]
    ReferenceMismatch { max_abs_diff: f32 },
}

impl SparsityError {
    pub(crate) fn shape(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        SparsityError::ShapeMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        SparsityError::UnsupportedConfiguration(msg.into())
    }
}

/// 계측 연산 결과 타입
pub type Result<T> = std::result::Result<T, SparsityError>;
