use super::super::{
    apply_snapshots, export_statistics, instrument, load_snapshots, read_npy, save_snapshots, write_npy, ModelGraph,
    SparsityReport,
};
use super::{relu_input, small_model};
use crate::core::config::InstrumentConfig;
use approx::assert_abs_diff_eq;
use ndarray::{arr2, Array1, Ix1, Ix2};
use tempfile::tempdir;

#[test]
fn npy_쓰기_읽기_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("m.npy");
    let matrix = arr2(&[[1.0f64, 2.0, 3.0], [4.0, 5.0, 6.5]]);
    write_npy(&path, &matrix).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..6], b"\x93NUMPY");
    // 헤더는 64바이트 정렬, 데이터는 6 * 8바이트
    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    assert_eq!((10 + header_len) % 64, 0);
    assert_eq!(bytes.len(), 10 + header_len + 48);
    let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
    assert!(header.contains("'shape': (2, 3)"));

    let back = read_npy::<f64>(&path).unwrap().into_dimensionality::<Ix2>().unwrap();
    assert_eq!(back, matrix);

    let vector = Array1::from(vec![7u64, 8, 9]);
    let path = dir.path().join("v.npy");
    write_npy(&path, &vector).unwrap();
    let header = std::fs::read(&path).unwrap();
    assert!(String::from_utf8_lossy(&header).contains("'shape': (3,)"));
    assert_eq!(read_npy::<u64>(&path).unwrap().into_dimensionality::<Ix1>().unwrap(), vector);

    // 원소 타입이 다르면 거부
    assert!(read_npy::<f64>(&path).is_err());
}

#[test]
fn 통계_파일_내보내기_테스트() {
    let mut model = small_model(21);
    instrument(&mut model, &InstrumentConfig::default().with_moving_average(3)).unwrap();
    for seed in 0..2 {
        model.forward(relu_input(seed, (2, 3, 6, 6)).view()).unwrap();
    }

    let dir = tempdir().unwrap();
    let written = export_statistics(&model, "tiny", dir.path()).unwrap();

    for layer in ["conv1", "conv2"] {
        for stat in [
            "mean",
            "variance",
            "correlation",
            "histogram",
            "ma_mean",
            "ma_variance",
            "ma_correlation",
        ] {
            let path = dir.path().join(format!("tiny_{}_{}.npy", layer, stat));
            assert!(path.exists(), "{} 없음", path.display());
        }
    }
    assert_eq!(written.len(), 2 * 7 + 1);
    assert!(written.last().unwrap().ends_with("tiny_sparsity_summary.json"));

    let conv1 = model.instrumented()[0];
    let mean = read_npy::<f64>(dir.path().join("tiny_conv1_mean.npy")).unwrap();
    assert_eq!(&mean.into_dimensionality::<Ix1>().unwrap(), conv1.stats().unwrap().mean());
    let histogram = read_npy::<u64>(dir.path().join("tiny_conv1_histogram.npy")).unwrap();
    assert_eq!(histogram.shape(), &[3, 10]);

    let report = SparsityReport::load_json(dir.path().join("tiny_sparsity_summary.json")).unwrap();
    assert_eq!(report.layers.len(), 2);
    assert_eq!(report.model_name, "tiny");
    assert_abs_diff_eq!(report.layers[0].avg_sparsity, conv1.average_sparsity().unwrap(), epsilon = 1e-12);
}

#[test]
fn 단일_표본_상관_생략_테스트() {
    use crate::core::conv::Conv2d;
    use crate::core::transform::{Layer, Sequential};
    use ndarray::Array4;
    use std::sync::Arc;

    // 3x3 입력, 3x3 커널 -> 윈도우 하나
    let conv = Conv2d::from_weights(Array4::ones((1, 2, 3, 3)), None, None).unwrap();
    let mut model = Sequential::new();
    model.push("only", Layer::Conv(Arc::new(conv)));
    instrument(&mut model, &InstrumentConfig::default()).unwrap();
    model.forward(relu_input(3, (1, 2, 3, 3)).view()).unwrap();

    let dir = tempdir().unwrap();
    export_statistics(&model, "one", dir.path()).unwrap();
    assert!(dir.path().join("one_only_mean.npy").exists());
    assert!(dir.path().join("one_only_variance.npy").exists());
    assert!(!dir.path().join("one_only_correlation.npy").exists());
    assert!(!dir.path().join("one_only_ma_mean.npy").exists());
}

#[test]
fn 스냅샷_저장_복원_테스트() {
    let mut model = small_model(22);
    instrument(&mut model, &InstrumentConfig::default().with_input_sparsity(Some(3))).unwrap();
    model.forward(relu_input(4, (1, 3, 6, 6)).view()).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("snap.bin");
    assert_eq!(save_snapshots(&model, &path).unwrap(), 2);

    let snapshots = load_snapshots(&path).unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0], model.instrumented()[0].snapshot());

    let mut fresh = small_model(22);
    instrument(&mut fresh, &InstrumentConfig::default().with_input_sparsity(Some(3))).unwrap();
    assert_eq!(apply_snapshots(&mut fresh, snapshots).unwrap(), 2);
    assert_eq!(fresh.instrumented()[1].stats(), model.instrumented()[1].stats());
    assert_eq!(fresh.instrumented()[0].histogram(), model.instrumented()[0].histogram());
}
