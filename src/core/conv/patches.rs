//! 패치 단위 컨볼루션 재표현
//!
//! 융합된 컨볼루션 커널 대신 수용 영역 패치를 직접 꺼내 출력 채널별로 복제하고,
//! 합산 전의 탭별 곱을 만든다. 공간 출력을 t×t 블록으로 나눠 한 번에 한 블록의
//! 곱 텐서만 메모리에 둔다.

use super::layer::{Conv2d, PaddingMode};
use super::tiling::{SpatialBlock, TileGrid};
use crate::core::error::{Result, SparsityError};
use ndarray::{s, Array4, Array6, ArrayD, ArrayView4, Axis, IxDyn};

/// 블록 곱 텐서의 축 순서
///
/// [batch, h_block, w_block, groups, out/groups, in/groups, kh, kw]
pub const PRODUCT_RANK: usize = 8;

/// 한 입력 배치에 대한 패치 전개기
pub struct PatchExpander<'a> {
    conv: &'a Conv2d,
    /// 0으로 패딩된 입력 [batch, in_channels, H + 2ph, W + 2pw]
    padded: Array4<f32>,
    /// [groups, out/groups, in/groups, kh, kw]
    grouped_weight: ArrayD<f32>,
    grid: TileGrid,
}

impl<'a> PatchExpander<'a> {
    /// 입력을 패딩하고 타일 격자를 정함
    pub fn new(conv: &'a Conv2d, input: ArrayView4<f32>, preferred_tile: usize) -> Result<Self> {
        if conv.padding_mode() != PaddingMode::Zeros {
            return Err(SparsityError::unsupported(format!(
                "patch decomposition requires zero padding, layer uses {:?}",
                conv.padding_mode()
            )));
        }
        let (h_out, w_out) = conv.check_input(&input)?;

        let (batch, channels, height, width) = input.dim();
        let (ph, pw) = conv.padding();
        let mut padded = Array4::<f32>::zeros((batch, channels, height + 2 * ph, width + 2 * pw));
        padded
            .slice_mut(s![.., .., ph..ph + height, pw..pw + width])
            .assign(&input);

        let (kh, kw) = conv.kernel_size();
        let grouped_shape = [
            conv.groups(),
            conv.out_channels_per_group(),
            conv.in_channels_per_group(),
            kh,
            kw,
        ];
        let grouped_weight = ArrayD::from_shape_vec(IxDyn(&grouped_shape), conv.weight().iter().copied().collect())
            .map_err(|_| SparsityError::shape("grouped weight", conv.weight().len(), grouped_shape.iter().product()))?;

        Ok(Self {
            conv,
            padded,
            grouped_weight,
            grid: TileGrid::new(h_out, w_out, preferred_tile),
        })
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn batch_size(&self) -> usize {
        self.padded.dim().0
    }

    /// 블록 하나의 곱 텐서 원소 수
    pub fn block_elements(&self) -> usize {
        let (rows, cols) = self.grid.block_size();
        let (kh, kw) = self.conv.kernel_size();
        self.batch_size()
            * rows
            * cols
            * self.conv.out_channels()
            * self.conv.in_channels_per_group()
            * kh
            * kw
    }

    /// 블록의 탭별 곱 텐서
    ///
    /// 탭 (u, v)마다 stride 간격의 입력 윈도우를 잘라 패치 텐서
    /// [batch, h_block, w_block, in_channels, kh, kw]에 모은 뒤, out/groups 축을 1로 두고
    /// 그룹별 가중치 [groups, out/groups, in/groups, kh, kw]와 브로드캐스트 곱한다.
    pub fn block_product(&self, block: &SpatialBlock) -> Result<ArrayD<f32>> {
        let conv = self.conv;
        let groups = conv.groups();
        let in_per_group = conv.in_channels_per_group();
        let (kh, kw) = conv.kernel_size();
        let (dh, dw) = conv.stride();
        let (batch, channels, _, _) = self.padded.dim();

        let mut patches = Array6::<f32>::zeros((batch, block.rows, block.cols, channels, kh, kw));
        for u in 0..kh {
            for v in 0..kw {
                let row = block.row_start * dh + u;
                let col = block.col_start * dw + v;
                let window = self.padded.slice(s![
                    ..,
                    ..,
                    row..row + (block.rows - 1) * dh + 1;dh,
                    col..col + (block.cols - 1) * dw + 1;dw
                ]);
                patches
                    .slice_mut(s![.., .., .., .., u, v])
                    .assign(&window.permuted_axes([0, 2, 3, 1]));
            }
        }

        // 채널 축 g * in/groups + c 를 [groups, 1, in/groups]로 분리
        let patches = patches
            .into_shape(IxDyn(&[batch, block.rows, block.cols, groups, 1, in_per_group, kh, kw]))
            .map_err(|_| SparsityError::shape("PatchExpander::block_product", channels, groups * in_per_group))?;

        let product = &patches * &self.grouped_weight;
        if product.is_standard_layout() {
            Ok(product)
        } else {
            Ok(product.as_standard_layout().into_owned())
        }
    }

    /// 모든 블록을 차례로 전개해 `visit`에 넘긴다
    ///
    /// 각 곱 텐서는 `visit`이 반환되면 버려진다.
    pub fn for_each_block<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&SpatialBlock, ArrayD<f32>) -> Result<()>,
    {
        for block in self.grid.blocks() {
            let product = self.block_product(&block)?;
            visit(&block, product)?;
        }
        Ok(())
    }

    /// 곱 텐서를 합산해 블록의 컨볼루션 출력을 `output`에 기록
    ///
    /// `output`은 [batch, out_channels, h_out, w_out]. 참조 검사 모드에서만 쓴다.
    pub fn reconstruct_block(&self, block: &SpatialBlock, product: &ArrayD<f32>, output: &mut Array4<f32>) {
        let conv = self.conv;
        let out_per_group = conv.out_channels_per_group();

        // [b, i, j, g, o, c, u, v] -> [b, i, j, g, o]
        let reduced = product
            .sum_axis(Axis(PRODUCT_RANK - 1))
            .sum_axis(Axis(PRODUCT_RANK - 2))
            .sum_axis(Axis(PRODUCT_RANK - 3));

        for (ix, &value) in reduced.indexed_iter() {
            let (b, i, j, g, o) = (ix[0], ix[1], ix[2], ix[3], ix[4]);
            let oc = g * out_per_group + o;
            let bias = conv.bias().map_or(0.0, |bias| bias[oc]);
            output[[b, oc, block.row_start + i, block.col_start + j]] = value + bias;
        }
    }
}
