//! 조합 보조 함수들

pub mod combinatorics;

#[cfg(test)]
mod __tests__;

pub use combinatorics::*;
