//! 타일 크기 선택을 위한 약수 계산

use std::collections::BTreeSet;

/// 기본 타일 인자 (7×7 공간 블록)
pub const DEFAULT_TILE_FACTOR: usize = 7;

/// n의 모든 양의 약수
///
/// 1..=√n 구간을 훑으며 약수 i와 n/i를 함께 넣는다. 결과에는 항상 1과 n이 포함된다.
pub fn factors(n: usize) -> BTreeSet<usize> {
    assert!(n >= 1, "factors() requires n >= 1, got {}", n);

    let mut result = BTreeSet::new();
    let mut i = 1;
    while i * i <= n {
        if n % i == 0 {
            result.insert(i);
            result.insert(n / i);
        }
        i += 1;
    }
    result
}

/// 1보다 큰 가장 작은 약수 (n == 1이면 None)
pub fn smallest_nontrivial_factor(n: usize) -> Option<usize> {
    factors(n).into_iter().find(|&f| f > 1)
}

/// 공간 출력 (h_out, w_out)을 t×t 블록으로 나눌 타일 인자 선택
///
/// 1. h_out이 preferred로 나누어지면 preferred 사용
/// 2. 아니면 h_out의 가장 작은 비자명 약수
/// 3. w_out이 그 값으로 나누어지지 않으면 1 (타일링 없음)
pub fn select_tile_factor(h_out: usize, w_out: usize, preferred: usize) -> usize {
    if h_out == 0 || w_out == 0 || preferred <= 1 {
        return 1;
    }

    let t = if h_out % preferred == 0 {
        preferred
    } else {
        smallest_nontrivial_factor(h_out).unwrap_or(1)
    };

    if w_out % t != 0 {
        1
    } else {
        t
    }
}
