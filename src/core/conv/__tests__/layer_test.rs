use super::super::{Conv2d, Conv2dConfig, PaddingMode};
use super::relu_input;
use crate::core::error::SparsityError;
use approx::assert_abs_diff_eq;
use ndarray::{s, Array1, Array4};
use rand::{rngs::StdRng, SeedableRng};

#[test]
fn 직접_컨볼루션_알려진_값_테스트() {
    let input = Array4::from_shape_fn((1, 1, 4, 4), |(_, _, i, j)| (i * 4 + j + 1) as f32);
    let kernel = Array4::from_shape_fn((1, 1, 3, 3), |(_, _, _, v)| match v {
        0 => 1.0,
        1 => 0.0,
        _ => -1.0,
    });
    let conv = Conv2d::from_weights(kernel, None, None).unwrap();

    let out = conv.forward(input.view()).unwrap();
    assert_eq!(out.shape(), &[1, 1, 2, 2]);
    for &v in out.iter() {
        assert_abs_diff_eq!(v, -6.0, epsilon = 1e-6);
    }

    println!("✅ 직접 컨볼루션 테스트 통과: {:?}", out.iter().collect::<Vec<_>>());
}

#[test]
fn 편향_스트라이드_패딩_테스트() {
    let input = Array4::from_elem((2, 1, 5, 5), 1.0f32);
    let weight = Array4::from_elem((3, 1, 3, 3), 1.0f32);
    let bias = Array1::from(vec![0.5f32, -1.0, 2.0]);
    let config = Conv2dConfig {
        stride: (2, 2),
        padding: (1, 1),
        ..Default::default()
    };
    let conv = Conv2d::from_weights(weight, Some(bias), Some(config)).unwrap();

    let out = conv.forward(input.view()).unwrap();
    assert_eq!(out.shape(), &[2, 3, 3, 3]);

    // 모서리: 4개 탭만 유효, 가운데: 9개
    assert_abs_diff_eq!(out[[0, 0, 0, 0]], 4.5, epsilon = 1e-6);
    assert_abs_diff_eq!(out[[1, 1, 1, 1]], 8.0, epsilon = 1e-6);
    assert_abs_diff_eq!(out[[1, 2, 0, 1]], 8.0, epsilon = 1e-6);
}

#[test]
fn 그룹_컨볼루션_분리_계산_일치_테스트() {
    let mut rng = StdRng::seed_from_u64(5);
    let config = Conv2dConfig {
        groups: 2,
        padding: (1, 1),
        ..Default::default()
    };
    let grouped = Conv2d::random(4, 6, (3, 3), true, Some(config), &mut rng).unwrap();
    let input = relu_input(8, (2, 4, 6, 6));
    let out = grouped.forward(input.view()).unwrap();

    // 그룹마다 독립된 컨볼루션으로 다시 계산
    for g in 0..2 {
        let weight = grouped.weight().slice(s![g * 3..(g + 1) * 3, .., .., ..]).to_owned();
        let bias = grouped.bias().unwrap().slice(s![g * 3..(g + 1) * 3]).to_owned();
        let single = Conv2d::from_weights(
            weight,
            Some(bias),
            Some(Conv2dConfig {
                padding: (1, 1),
                ..Default::default()
            }),
        )
        .unwrap();
        let part = input.slice(s![.., g * 2..(g + 1) * 2, .., ..]).to_owned();
        let expected = single.forward(part.view()).unwrap();
        let actual = out.slice(s![.., g * 3..(g + 1) * 3, .., ..]);
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *e, epsilon = 1e-6);
        }
    }
}

#[test]
fn 복제_패딩_테스트() {
    let input = Array4::from_shape_vec((1, 1, 2, 2), vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
    let weight = Array4::from_elem((1, 1, 3, 3), 1.0f32);
    let config = Conv2dConfig {
        padding: (1, 1),
        padding_mode: PaddingMode::Replicate,
        ..Default::default()
    };
    let conv = Conv2d::from_weights(weight.clone(), None, Some(config)).unwrap();
    let out = conv.forward(input.view()).unwrap();
    assert_abs_diff_eq!(out[[0, 0, 0, 0]], 18.0, epsilon = 1e-6);

    // 순환 패딩: 2×2 입력에서 3×3 윈도우는 모든 원소를 포함
    let circular = Conv2d::from_weights(
        weight,
        None,
        Some(Conv2dConfig {
            padding_mode: PaddingMode::Circular,
            ..config
        }),
    )
    .unwrap();
    let out = circular.forward(input.view()).unwrap();
    // 행 {-1,0,1} -> {1,0,1}, 열도 동일
    let expected = 1.0 * 1.0 + 2.0 * 2.0 + 3.0 * 2.0 + 4.0 * 4.0;
    assert_abs_diff_eq!(out[[0, 0, 0, 0]], expected, epsilon = 1e-6);
}

#[test]
fn 레이어_설정_오류_테스트() {
    let weight = Array4::<f32>::zeros((3, 2, 3, 3));

    let err = Conv2d::from_weights(
        weight.clone(),
        None,
        Some(Conv2dConfig {
            groups: 2,
            ..Default::default()
        }),
    )
    .unwrap_err();
    assert!(matches!(err, SparsityError::UnsupportedConfiguration(_)));

    let err = Conv2d::from_weights(
        weight.clone(),
        None,
        Some(Conv2dConfig {
            stride: (0, 1),
            ..Default::default()
        }),
    )
    .unwrap_err();
    assert!(matches!(err, SparsityError::UnsupportedConfiguration(_)));

    let err = Conv2d::from_weights(weight.clone(), Some(Array1::zeros(2)), None).unwrap_err();
    assert!(matches!(err, SparsityError::ShapeMismatch { expected: 3, actual: 2, .. }));

    let conv = Conv2d::from_weights(weight, None, None).unwrap();
    assert_eq!(conv.in_channels(), 2);
    assert_eq!(conv.kk(), 9);

    let err = conv.forward(Array4::zeros((1, 3, 5, 5)).view()).unwrap_err();
    assert!(matches!(err, SparsityError::ShapeMismatch { expected: 2, actual: 3, .. }));

    // 커널보다 작은 입력
    let err = conv.forward(Array4::zeros((1, 2, 2, 5)).view()).unwrap_err();
    assert!(matches!(err, SparsityError::ShapeMismatch { .. }));
}
