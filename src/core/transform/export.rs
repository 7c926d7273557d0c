//! # 통계 내보내기
//!
//! 레이어별 누적 통계를 `.npy` 파일로, 요약 표를 JSON으로, 누적기 상태를 bincode
//! 스냅샷으로 저장한다.

use super::model::ModelGraph;
use super::report::SparsityReport;
use crate::core::observer::{InstrumentedConv2d, LayerSnapshot};
use crate::core::stats::StreamStatistics;
use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{info, warn};
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// `.npy`로 쓸 수 있는 원소 타입
pub trait NpyElement: Copy {
    const DESCR: &'static str;

    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()>;

    fn read_le<R: Read>(reader: &mut R) -> std::io::Result<Self>;
}

impl NpyElement for f64 {
    const DESCR: &'static str = "<f8";

    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_f64::<LittleEndian>(self)
    }

    fn read_le<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        reader.read_f64::<LittleEndian>()
    }
}

impl NpyElement for u64 {
    const DESCR: &'static str = "<u8";

    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u64::<LittleEndian>(self)
    }

    fn read_le<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        reader.read_u64::<LittleEndian>()
    }
}

fn npy_header(descr: &str, shape: &[usize]) -> Vec<u8> {
    let shape = match shape {
        [single] => format!("({},)", single),
        dims => format!(
            "({})",
            dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr, shape
    );

    // magic(6) + version(2) + 길이(2) + header + '\n' 이 64바이트 정렬
    let unpadded = NPY_MAGIC.len() + 4 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');
    header.into_bytes()
}

/// 배열을 NPY 1.0 형식 (C 순서, 리틀 엔디언)으로 저장
pub fn write_npy<A, S, D>(path: impl AsRef<Path>, array: &ArrayBase<S, D>) -> Result<()>
where
    A: NpyElement,
    S: Data<Elem = A>,
    D: Dimension,
{
    let path = path.as_ref();
    let header = npy_header(A::DESCR, array.shape());
    let mut writer = BufWriter::new(
        File::create(path).with_context(|| format!("파일 생성 실패: {}", path.display()))?,
    );

    writer.write_all(NPY_MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_u16::<LittleEndian>(header.len() as u16)?;
    writer.write_all(&header)?;
    for &value in array.iter() {
        value.write_le(&mut writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// [`write_npy`]로 쓴 파일 읽기
pub fn read_npy<A: NpyElement>(path: impl AsRef<Path>) -> Result<ArrayD<A>> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path).with_context(|| format!("파일 열기 실패: {}", path.display()))?);

    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if magic != NPY_MAGIC {
        bail!("NPY 파일이 아님: {}", path.display());
    }
    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    if version[0] != 1 {
        bail!("지원하지 않는 NPY 버전 {}.{}", version[0], version[1]);
    }
    let header_len = reader.read_u16::<LittleEndian>()? as usize;
    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8(header)?;

    if !header.contains(&format!("'descr': '{}'", A::DESCR)) {
        bail!("원소 타입 불일치: {} 기대, 헤더 {}", A::DESCR, header.trim());
    }
    if header.contains("'fortran_order': True") {
        bail!("fortran 순서 배열은 지원하지 않음");
    }
    let shape = parse_shape(&header).with_context(|| format!("형상 파싱 실패: {}", header.trim()))?;

    let len: usize = shape.iter().product();
    let values = (0..len)
        .map(|_| A::read_le(&mut reader))
        .collect::<std::io::Result<Vec<A>>>()?;
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
}

fn parse_shape(header: &str) -> Option<Vec<usize>> {
    let start = header.find("'shape': (")? + "'shape': (".len();
    let end = start + header[start..].find(')')?;
    header[start..end]
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| dim.parse().ok())
        .collect()
}

fn stat_path(out_dir: &Path, model_name: &str, layer_name: &str, stat: &str) -> PathBuf {
    out_dir.join(format!("{}_{}_{}.npy", model_name, layer_name, stat))
}

/// 평균, 분산, (표본이 둘 이상이면) 상관 행렬 저장
fn export_stream_stats(
    stats: &StreamStatistics,
    out_dir: &Path,
    model_name: &str,
    layer_name: &str,
    prefix: &str,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if stats.count() == 0 {
        warn!("{}: {}통계 표본 없음, 건너뜀", layer_name, prefix);
        return Ok(written);
    }

    let path = stat_path(out_dir, model_name, layer_name, &format!("{}mean", prefix));
    write_npy(&path, stats.mean())?;
    written.push(path);

    let path = stat_path(out_dir, model_name, layer_name, &format!("{}variance", prefix));
    write_npy(&path, &stats.variance())?;
    written.push(path);

    if stats.has_covariance() {
        let path = stat_path(out_dir, model_name, layer_name, &format!("{}correlation", prefix));
        write_npy(&path, &stats.correlation())?;
        written.push(path);
    } else {
        warn!("{}: 표본이 하나뿐이라 {}correlation 생략", layer_name, prefix);
    }
    Ok(written)
}

/// 레이어 하나의 통계 파일 저장
pub fn export_layer(layer: &InstrumentedConv2d, out_dir: &Path, model_name: &str) -> Result<Vec<PathBuf>> {
    let name = layer.name();
    let (Some(stats), Some(histogram)) = (layer.stats(), layer.histogram()) else {
        warn!("{}: 관측 없음, 내보내기 건너뜀", name);
        return Ok(Vec::new());
    };

    let mut written = export_stream_stats(stats, out_dir, model_name, name, "")?;

    let path = stat_path(out_dir, model_name, name, "histogram");
    write_npy(&path, histogram.bins())?;
    written.push(path);

    if let Some(tracker) = layer.moving_average() {
        written.extend(export_stream_stats(&tracker.stats, out_dir, model_name, name, "ma_")?);
    }
    Ok(written)
}

/// 모든 계측 레이어의 통계와 요약 JSON 저장
///
/// 반환값은 쓰인 파일 경로들 (요약 JSON이 마지막).
pub fn export_statistics<M: ModelGraph>(model: &M, model_name: &str, out_dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir).with_context(|| format!("출력 디렉토리 생성 실패: {}", out_dir.display()))?;

    let mut written = Vec::new();
    for layer in model.instrumented() {
        written.extend(export_layer(layer, out_dir, model_name)?);
    }

    let summary_path = out_dir.join(format!("{}_sparsity_summary.json", model_name));
    SparsityReport::from_model(model, model_name).save_json(&summary_path)?;
    written.push(summary_path);

    info!("통계 파일 {}개 저장: {}", written.len(), out_dir.display());
    Ok(written)
}

/// 계측 레이어들의 누적기 상태를 bincode로 저장
pub fn save_snapshots<M: ModelGraph>(model: &M, path: impl AsRef<Path>) -> Result<usize> {
    let snapshots: Vec<LayerSnapshot> = model.instrumented().iter().map(|layer| layer.snapshot()).collect();
    let writer = BufWriter::new(File::create(path.as_ref())?);
    bincode::serialize_into(writer, &snapshots)?;
    Ok(snapshots.len())
}

/// bincode 스냅샷 파일 읽기
pub fn load_snapshots(path: impl AsRef<Path>) -> Result<Vec<LayerSnapshot>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(bincode::deserialize_from(reader)?)
}

/// 이름이 같은 계측 레이어에 스냅샷을 되돌려 넣고 적용한 수 반환
pub fn apply_snapshots<M: ModelGraph>(model: &mut M, snapshots: Vec<LayerSnapshot>) -> Result<usize> {
    let mut layers = model.instrumented_mut();
    let mut applied = 0;
    for snapshot in snapshots {
        match layers.iter_mut().find(|layer| layer.name() == snapshot.name) {
            Some(layer) => {
                layer.restore_snapshot(snapshot)?;
                applied += 1;
            }
            None => warn!("스냅샷 레이어 '{}'가 모델에 없음", snapshot.name),
        }
    }
    Ok(applied)
}
