//! 공간 출력 블록 분할

use crate::core::math::select_tile_factor;

/// 출력 공간의 한 블록
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialBlock {
    /// 블록 위치 (출력 좌표)
    pub row_start: usize,
    pub col_start: usize,
    pub rows: usize,
    pub cols: usize,
}

/// (h_out, w_out) 출력을 t×t 블록으로 나눈 격자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub h_out: usize,
    pub w_out: usize,
    pub factor: usize,
}

impl TileGrid {
    /// 선호 타일 인자로부터 나누어떨어지는 인자를 골라 격자 생성
    pub fn new(h_out: usize, w_out: usize, preferred: usize) -> Self {
        Self {
            h_out,
            w_out,
            factor: select_tile_factor(h_out, w_out, preferred),
        }
    }

    /// 블록 하나의 크기 (rows, cols)
    pub fn block_size(&self) -> (usize, usize) {
        (self.h_out / self.factor, self.w_out / self.factor)
    }

    pub fn block_count(&self) -> usize {
        self.factor * self.factor
    }

    /// 행 우선 순서의 블록들
    pub fn blocks(&self) -> impl Iterator<Item = SpatialBlock> {
        let (rows, cols) = self.block_size();
        let factor = self.factor;
        (0..factor).flat_map(move |bi| {
            (0..factor).map(move |bj| SpatialBlock {
                row_start: bi * rows,
                col_start: bj * cols,
                rows,
                cols,
            })
        })
    }
}
