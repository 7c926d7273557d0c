//! 가중 평균 측정기

use serde::{Deserialize, Serialize};

/// 최근 값과 가중 평균을 유지하는 측정기
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageMeter {
    pub name: String,
    pub val: f64,
    pub sum: f64,
    pub count: usize,
    pub avg: f64,
}

impl AverageMeter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            val: 0.0,
            sum: 0.0,
            count: 0,
            avg: 0.0,
        }
    }

    /// 값 하나를 가중치 n으로 반영
    pub fn update(&mut self, val: f64, n: usize) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n;
        if self.count > 0 {
            self.avg = self.sum / self.count as f64;
        }
    }

    pub fn reset(&mut self) {
        self.val = 0.0;
        self.sum = 0.0;
        self.count = 0;
        self.avg = 0.0;
    }
}
