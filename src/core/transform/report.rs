//! # 희소성 리포트
//!
//! 계측 레이어별 요약 표와 연산량 가중 모델 전체 희소성

use super::model::ModelGraph;
use crate::core::observer::{InputSparsityMonitor, InstrumentedConv2d};
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// 레이어 요약 행
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub name: String,
    pub layer_type: String,
    pub kk: usize,
    /// 관측된 커널 윈도우 인스턴스 수
    pub samples: usize,
    /// 평균 영 탭 개수
    pub avg_zeros: f64,
    /// avg_zeros / kk
    pub avg_sparsity: f64,
    /// 모든 탭이 0인 윈도우 비율
    pub all_zero_fraction: f64,
    pub ops: usize,
    /// 복제된 곱 텐서 원소 단위 희소성
    pub element_sparsity: f64,
    pub moving_average_sparsity: Option<f64>,
    pub input_sparsity: Option<f64>,
}

impl LayerSummary {
    /// 관측이 한 번도 없었던 레이어는 None
    pub fn from_layer(layer: &InstrumentedConv2d) -> Option<Self> {
        let avg_zeros = layer.average_zeros()?;
        let histogram = layer.histogram()?;
        let kk = layer.kk();

        let moving_average_sparsity = layer
            .moving_average()
            .filter(|tracker| tracker.stats.count() > 0)
            .map(|tracker| tracker.stats.mean_of_means() / kk as f64);

        Some(Self {
            name: layer.name().to_string(),
            layer_type: "Conv2d".to_string(),
            kk,
            samples: layer.stats().map_or(0, |stats| stats.count()),
            avg_zeros,
            avg_sparsity: avg_zeros / kk as f64,
            all_zero_fraction: histogram.all_zero_fraction(),
            ops: layer.ops(),
            element_sparsity: layer.layer_sparsity().avg,
            moving_average_sparsity,
            input_sparsity: layer.input_monitor().and_then(InputSparsityMonitor::average_sparsity),
        })
    }
}

/// 모델 전체 희소성 리포트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparsityReport {
    pub model_name: String,
    pub generated_at: DateTime<Utc>,
    pub layers: Vec<LayerSummary>,
    pub total_ops: usize,
    /// Σ(sparsity_i * ops_i) / Σ ops_i
    pub overall_sparsity: f64,
}

impl SparsityReport {
    pub fn from_model<M: ModelGraph>(model: &M, model_name: &str) -> Self {
        let mut layers = Vec::new();
        for layer in model.instrumented() {
            match LayerSummary::from_layer(layer) {
                Some(summary) => layers.push(summary),
                None => warn!("{}: 관측 없음, 리포트에서 제외", layer.name()),
            }
        }
        Self::from_summaries(model_name, layers)
    }

    pub fn from_summaries(model_name: &str, layers: Vec<LayerSummary>) -> Self {
        let total_ops = layers.iter().map(|layer| layer.ops).sum();
        let overall_sparsity = Self::ops_weighted_sparsity(&layers);
        Self {
            model_name: model_name.to_string(),
            generated_at: Utc::now(),
            layers,
            total_ops,
            overall_sparsity,
        }
    }

    /// 연산량 가중 평균 희소성 (연산량이 없으면 0)
    pub fn ops_weighted_sparsity(layers: &[LayerSummary]) -> f64 {
        let total_ops: usize = layers.iter().map(|layer| layer.ops).sum();
        if total_ops == 0 {
            return 0.0;
        }
        let weighted: f64 = layers
            .iter()
            .map(|layer| layer.avg_sparsity * layer.ops as f64)
            .sum();
        weighted / total_ops as f64
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    /// 리포트 출력
    pub fn print_report(&self) {
        println!("\n=== 희소성 리포트: {} ===", self.model_name);
        println!("생성 시각: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!(
            "{:<16} {:>4} {:>10} {:>10} {:>10} {:>10} {:>12}",
            "레이어", "kk", "샘플", "평균 영", "희소성", "전부 영", "연산량"
        );
        for layer in &self.layers {
            println!(
                "{:<16} {:>4} {:>10} {:>10.3} {:>9.1}% {:>9.1}% {:>12}",
                layer.name,
                layer.kk,
                layer.samples,
                layer.avg_zeros,
                layer.avg_sparsity * 100.0,
                layer.all_zero_fraction * 100.0,
                layer.ops
            );
            if let Some(ma) = layer.moving_average_sparsity {
                println!("  이동 평균 희소성: {:.1}%", ma * 100.0);
            }
            if let Some(input) = layer.input_sparsity {
                println!("  입력 희소성: {:.1}%", input * 100.0);
            }
            println!("  원소 단위 희소성: {:.1}%", layer.element_sparsity * 100.0);
        }

        println!("\n=== 모델 전체 ===");
        println!("총 연산량: {}", self.total_ops);
        println!("연산량 가중 희소성: {:.2}%", self.overall_sparsity * 100.0);
    }
}
