use super::super::combinatorics::*;

#[test]
fn 약수_계산_테스트() {
    let f: Vec<usize> = factors(28).into_iter().collect();
    assert_eq!(f, vec![1, 2, 4, 7, 14, 28]);

    // 제곱수는 중복 없이
    let f: Vec<usize> = factors(49).into_iter().collect();
    assert_eq!(f, vec![1, 7, 49]);

    let f: Vec<usize> = factors(1).into_iter().collect();
    assert_eq!(f, vec![1]);

    println!("✅ 약수 계산 테스트 통과");
}

#[test]
fn 약수_항상_1과_n_포함_테스트() {
    for n in 1..200 {
        let f = factors(n);
        assert!(f.contains(&1));
        assert!(f.contains(&n));
        assert!(f.iter().all(|&d| n % d == 0), "n={}의 약수가 아닌 값 포함", n);
    }
}

#[test]
fn 가장_작은_비자명_약수_테스트() {
    assert_eq!(smallest_nontrivial_factor(1), None);
    assert_eq!(smallest_nontrivial_factor(13), Some(13));
    assert_eq!(smallest_nontrivial_factor(15), Some(3));
    assert_eq!(smallest_nontrivial_factor(56), Some(2));
}

#[test]
fn 타일_인자_선택_테스트() {
    // 7로 나누어지면 기본값 유지
    assert_eq!(select_tile_factor(56, 56, DEFAULT_TILE_FACTOR), 7);
    assert_eq!(select_tile_factor(14, 7, DEFAULT_TILE_FACTOR), 7);

    // h_out이 7의 배수가 아니면 가장 작은 약수
    assert_eq!(select_tile_factor(32, 32, DEFAULT_TILE_FACTOR), 2);
    assert_eq!(select_tile_factor(15, 15, DEFAULT_TILE_FACTOR), 3);

    // w_out이 나누어지지 않으면 1
    assert_eq!(select_tile_factor(32, 15, DEFAULT_TILE_FACTOR), 1);
    assert_eq!(select_tile_factor(56, 10, DEFAULT_TILE_FACTOR), 1);

    // 1×1 출력과 타일링 비활성화
    assert_eq!(select_tile_factor(1, 1, DEFAULT_TILE_FACTOR), 1);
    assert_eq!(select_tile_factor(28, 28, 1), 1);

    println!("✅ 타일 인자 선택 테스트 통과");
}
